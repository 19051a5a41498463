//! Document watermark CLI tool
//!
//! Adds a text watermark to PDF, Word and Excel files, one file or a whole directory.

use anyhow::Result;
use clap::builder::NonEmptyStringValueParser;
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use doc_watermark::{process_directory, process_file};

/// 给 PDF、Word、Excel 文件添加水印
#[derive(Parser)]
#[command(name = "doc-watermark")]
#[command(author, version, about = "给 PDF、Word、Excel 文件添加水印", long_about = None)]
#[command(after_help = "示例:
  doc-watermark -t \"机密文件\" file.pdf
  doc-watermark -t \"内部使用\" -d ./documents
  doc-watermark -t \"仅供参考\" -d ./docs -o ./watermarked
  doc-watermark -t \"禁止外传\" -d ./docs --overwrite")]
struct Cli {
    /// 文件或目录路径
    path: Option<PathBuf>,

    /// 水印文字
    #[arg(short, long, value_parser = NonEmptyStringValueParser::new())]
    text: String,

    /// 处理整个目录
    #[arg(short, long, value_name = "DIRECTORY")]
    directory: Option<PathBuf>,

    /// 输出目录
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// 覆盖原文件
    #[arg(long)]
    overwrite: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Returns the process exit code
fn run(cli: Cli) -> Result<i32> {
    let target = match cli.directory.or(cli.path) {
        Some(target) => target,
        None => {
            Cli::command().print_help()?;
            return Ok(1);
        }
    };

    if !target.exists() {
        println!("错误: 路径不存在 - {}", target.display());
        return Ok(1);
    }

    let output = cli.output.as_deref();

    if target.is_file() {
        if process_file(&target, &cli.text, output, cli.overwrite) {
            println!("✓ 水印添加完成");
            Ok(0)
        } else {
            println!("✗ 水印添加失败");
            Ok(1)
        }
    } else {
        let summary = process_directory(&target, &cli.text, output, cli.overwrite);
        println!("\n完成: {} 成功, {} 失败", summary.success, summary.failed);
        Ok(0)
    }
}
