// 该文件是 Citodet （细胞检测） 项目的一部分。
// src/input.rs - 图像文件输入
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("No se pudo abrir la imagen {path}: {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("No se pudo decodificar la imagen {path}: {source}")]
  Decode {
    path: PathBuf,
    source: image::ImageError,
  },
}

/// 单张图像文件输入，格式按文件内容识别
#[derive(Debug, Clone)]
pub struct ImageFileInput {
  path: PathBuf,
  image: RgbImage,
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, InputError> {
    let path = path.as_ref();
    let io_err = |source| InputError::Io {
      path: path.to_path_buf(),
      source,
    };

    let image = ImageReader::open(path)
      .map_err(io_err)?
      .with_guessed_format()
      .map_err(io_err)?
      .decode()
      .map_err(|source| InputError::Decode {
        path: path.to_path_buf(),
        source,
      })
      .inspect_err(|e| error!("{}", e))?
      .to_rgb8();

    debug!(
      "读取图像 {}: {}x{}",
      path.display(),
      image.width(),
      image.height()
    );

    Ok(Self {
      path: path.to_path_buf(),
      image,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }
}
