//! Page-tree helpers: inherited attributes, resources and content streams

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{Error, Result};

/// Guards against cyclic Parent chains in damaged files
const MAX_TREE_DEPTH: usize = 64;

/// US Letter, used when no MediaBox is found anywhere in the tree
const DEFAULT_MEDIA_BOX: PageBox = PageBox {
    llx: 0.0,
    lly: 0.0,
    urx: 612.0,
    ury: 792.0,
};

/// A page rectangle in default user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub llx: f32,
    pub lly: f32,
    pub urx: f32,
    pub ury: f32,
}

impl PageBox {
    pub fn width(&self) -> f32 {
        self.urx - self.llx
    }

    pub fn height(&self) -> f32 {
        self.ury - self.lly
    }

    /// Point at fractions of the width and height, measured from the lower-left corner
    pub fn point_at(&self, fx: f32, fy: f32) -> (f32, f32) {
        (self.llx + self.width() * fx, self.lly + self.height() * fy)
    }

    fn from_array(values: &[Object]) -> Option<Self> {
        if values.len() != 4 {
            return None;
        }
        let nums: Vec<f32> = values.iter().filter_map(number).collect();
        if nums.len() != 4 {
            return None;
        }
        // Normalise boxes written with swapped corners
        Some(Self {
            llx: nums[0].min(nums[2]),
            lly: nums[1].min(nums[3]),
            urx: nums[0].max(nums[2]),
            ury: nums[1].max(nums[3]),
        })
    }
}

/// Numeric value of an Integer or Real object
pub fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Follow a reference (if any) to the object it names
fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Result<&'a Object> {
    match obj {
        Object::Reference(id) => Ok(doc.get_object(*id)?),
        other => Ok(other),
    }
}

fn page_dict(doc: &Document, page_id: ObjectId) -> Result<&Dictionary> {
    match doc.get_object(page_id)? {
        Object::Dictionary(dict) => Ok(dict),
        _ => Err(Error::General(format!(
            "page object {} {} is not a dictionary",
            page_id.0, page_id.1
        ))),
    }
}

/// Look up an inheritable page attribute, walking up the Parent chain
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Result<Option<&'a Object>> {
    let mut dict = page_dict(doc, page_id)?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = dict.get(key) {
            return Ok(Some(resolve(doc, value)?));
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => match doc.get_object(*parent_id)? {
                Object::Dictionary(parent) => dict = parent,
                _ => return Ok(None),
            },
            _ => return Ok(None),
        }
    }
    Ok(None)
}

/// Effective MediaBox of a page
pub fn media_box(doc: &Document, page_id: ObjectId) -> Result<PageBox> {
    let media_box = match inherited(doc, page_id, b"MediaBox")? {
        Some(Object::Array(values)) => PageBox::from_array(values),
        _ => None,
    };
    Ok(media_box.unwrap_or(DEFAULT_MEDIA_BOX))
}

/// Effective Resources of a page, with the top level dereferenced and cloned
pub fn resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    match inherited(doc, page_id, b"Resources")? {
        Some(Object::Dictionary(dict)) => Ok(dict.clone()),
        _ => Ok(Dictionary::new()),
    }
}

/// Register an XObject on a page under a name not already in use.
///
/// The page gets its own Resources dictionary so pages sharing an inherited
/// dictionary are not affected.
pub fn add_xobject(doc: &mut Document, page_id: ObjectId, base_name: &str, xobject_id: ObjectId) -> Result<String> {
    let mut resources = resources(doc, page_id)?;

    let mut xobjects = match resources.get(b"XObject") {
        Ok(obj) => match resolve(doc, obj)? {
            Object::Dictionary(dict) => dict.clone(),
            _ => Dictionary::new(),
        },
        Err(_) => Dictionary::new(),
    };

    let mut name = base_name.to_string();
    let mut suffix = 1;
    while xobjects.has(name.as_bytes()) {
        name = format!("{}{}", base_name, suffix);
        suffix += 1;
    }

    xobjects.set(name.as_bytes().to_vec(), Object::Reference(xobject_id));
    resources.set("XObject", Object::Dictionary(xobjects));

    if let Object::Dictionary(page) = doc.get_object_mut(page_id)? {
        page.set("Resources", Object::Dictionary(resources));
    }

    Ok(name)
}

/// Content stream references of a page, flattening an indirect array
fn content_refs(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>> {
    let page = page_dict(doc, page_id)?;
    let contents = match page.get(b"Contents") {
        Ok(contents) => contents,
        Err(_) => return Ok(Vec::new()),
    };

    Ok(match contents {
        Object::Array(items) => items.clone(),
        Object::Reference(id) => match doc.get_object(*id)? {
            Object::Array(items) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        _ => Vec::new(),
    })
}

/// Surround the page's existing content with `before` and `after` streams.
///
/// Streams are concatenated by viewers, so a `q` before and a `Q` after
/// isolate whatever graphics state the original content leaves behind.
pub fn wrap_contents(doc: &mut Document, page_id: ObjectId, before: Vec<u8>, after: Vec<u8>) -> Result<()> {
    let mut contents = content_refs(doc, page_id)?;

    let before_id = doc.add_object(Stream::new(Dictionary::new(), before));
    let after_id = doc.add_object(Stream::new(Dictionary::new(), after));

    contents.insert(0, Object::Reference(before_id));
    contents.push(Object::Reference(after_id));

    if let Object::Dictionary(page) = doc.get_object_mut(page_id)? {
        page.set("Contents", Object::Array(contents));
    }

    Ok(())
}
