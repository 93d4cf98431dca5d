// 该文件是 Citodet （细胞检测） 项目的一部分。
// src/output/save_image_file.rs - 保存标注图像
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
use tracing::info;

use crate::{
  model::{LabeledDetection, WithLabel},
  output::{OutputError, Render, draw::Draw, output_path_for},
};

/// 标注后写入文件，格式由扩展名决定，已存在则覆盖
pub struct SaveImageFileOutput<'a> {
  path: PathBuf,
  draw: Draw<'a>,
}

impl SaveImageFileOutput<'static> {
  pub fn new(path: impl Into<PathBuf>) -> Result<Self, OutputError> {
    Ok(Self {
      path: path.into(),
      draw: Draw::new()?,
    })
  }

  /// 写到源图像旁的 `<stem>_output<suffix>`
  pub fn beside(source: &Path) -> Result<Self, OutputError> {
    Self::new(output_path_for(source))
  }
}

impl SaveImageFileOutput<'_> {
  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: &RgbImage) -> Result<(), OutputError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(|source| OutputError::Io {
        path: parent.to_path_buf(),
        source,
      })?;
    }

    image.save(&self.path).map_err(|source| OutputError::Image {
      path: self.path.clone(),
      source,
    })?;

    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl<T: WithLabel> Render<T> for SaveImageFileOutput<'_> {
  type Error = OutputError;

  fn render_result(
    &self,
    image: &RgbImage,
    detections: &[LabeledDetection<T>],
  ) -> Result<(), Self::Error> {
    let annotated = self.draw.annotate(image, detections);
    self.save_image(&annotated)
  }
}
