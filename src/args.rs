// 该文件是 Citodet （细胞检测） 项目的一部分。
// src/args.rs - 命令行参数
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::PathBuf;

use clap::Parser;
use tracing::Level;

/// Citodet 细胞学病变检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 待检测的图像文件（PNG、JPEG、GIF、BMP）
  #[arg(value_name = "IMAGE_PATH")]
  pub image_path: PathBuf,

  /// 模型族: yolov5, yolov8, yolov12, fasterrcnn, retinanet（不区分大小写）
  #[arg(value_name = "MODEL_TYPE")]
  pub model: String,

  /// 权重目录，权重文件为 <DIR>/<MODEL_TYPE>.pt
  #[arg(long, default_value = "weights", value_name = "DIR")]
  pub weights_dir: PathBuf,

  /// 即使有可用的加速器也使用 CPU
  #[arg(long)]
  pub cpu: bool,

  /// 日志详细程度，可重复（-v 为 info，-vv 为 debug）
  #[arg(short, long, action = clap::ArgAction::Count)]
  pub verbose: u8,

  /// 多余的位置参数，忽略
  #[arg(hide = true, num_args = 0.., value_name = "IGNORED")]
  pub rest: Vec<String>,
}

impl Args {
  pub fn log_level(&self) -> Level {
    match self.verbose {
      0 => Level::WARN,
      1 => Level::INFO,
      _ => Level::DEBUG,
    }
  }
}
