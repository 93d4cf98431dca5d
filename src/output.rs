// 该文件是 Citodet （细胞检测） 项目的一部分。
// src/output.rs - 输出定义
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

use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;

use crate::model::{LabeledDetection, WithLabel};

pub mod draw;
mod report;
mod save_image_file;

pub use self::draw::Draw;
pub use self::report::{Report, ReportEntry};
pub use self::save_image_file::SaveImageFileOutput;

/// 把检测结果渲染到某个输出
pub trait Render<T: WithLabel> {
  type Error;
  fn render_result(
    &self,
    image: &RgbImage,
    detections: &[LabeledDetection<T>],
  ) -> Result<(), Self::Error>;
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("No se pudo cargar la fuente incrustada")]
  Font,
  #[error("Error de E/S al escribir {path}: {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("No se pudo guardar la imagen {path}: {source}")]
  Image {
    path: PathBuf,
    source: image::ImageError,
  },
  #[error("Error al serializar el resultado: {0}")]
  Json(#[from] serde_json::Error),
}

/// 标注图像的路径：与源图同目录、同扩展名，文件名为 `<stem>_output<suffix>`
pub fn output_path_for(source: &Path) -> PathBuf {
  let stem = source
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_default();
  let suffix = source
    .extension()
    .map(|e| format!(".{}", e.to_string_lossy()))
    .unwrap_or_default();
  source.with_file_name(format!("{}_output{}", stem, suffix))
}
