// 该文件是 Citodet （细胞检测） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;

use crate::{
  model::{BoundingBox, LabeledDetection, WithLabel},
  output::OutputError,
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 12.0;
const LABEL_OFFSET_Y: i32 = 10; // 文本位于框左上角上方
const BOX_THICKNESS: i32 = 3;
const BOX_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const TEXT_COLOR: [u8; 3] = [0, 0, 0]; // 黑色

static FONT_DATA: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

pub struct Draw<'a> {
  font: FontRef<'a>,
  font_size: f32,
  thickness: i32,
  box_color: [u8; 3],
  text_color: [u8; 3],
}

impl Draw<'static> {
  pub fn new() -> Result<Self, OutputError> {
    let font = FontRef::try_from_slice(FONT_DATA).map_err(|_| OutputError::Font)?;
    Ok(Self {
      font,
      font_size: LABEL_FONT_SIZE,
      thickness: BOX_THICKNESS,
      box_color: BOX_COLOR,
      text_color: TEXT_COLOR,
    })
  }
}

/// 标签文本：`<类别> <置信度>`
pub fn label_text<T: WithLabel>(item: &LabeledDetection<T>) -> String {
  format!(
    "{} {:?}",
    item.label.to_label_str(),
    item.detection.confidence
  )
}

fn put_pixel_clipped(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
  if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
    image.put_pixel(x as u32, y as u32, color);
  }
}

impl Draw<'_> {
  // 边框自外向内加粗，坍缩的环不绘制
  fn draw_bbox(&self, image: &mut RgbImage, bbox: &BoundingBox) {
    let color = Rgb(self.box_color);
    let (w, h) = (image.width() as i32, image.height() as i32);

    for t in 0..self.thickness {
      let (x_min, y_min) = (bbox.x1.saturating_add(t), bbox.y1.saturating_add(t));
      let (x_max, y_max) = (bbox.x2.saturating_sub(t), bbox.y2.saturating_sub(t));
      if x_min > x_max || y_min > y_max {
        break;
      }

      // Top and bottom edges
      for x in x_min.max(0)..=x_max.min(w - 1) {
        put_pixel_clipped(image, x, y_min, color);
        put_pixel_clipped(image, x, y_max, color);
      }

      // Left and right edges
      for y in y_min.max(0)..=y_max.min(h - 1) {
        put_pixel_clipped(image, x_min, y, color);
        put_pixel_clipped(image, x_max, y, color);
      }
    }
  }

  fn draw_label(&self, image: &mut RgbImage, bbox: &BoundingBox, text: &str) {
    draw_text_mut(
      image,
      Rgb(self.text_color),
      bbox.x1,
      bbox.y1.saturating_sub(LABEL_OFFSET_Y),
      PxScale::from(self.font_size),
      &self.font,
      text,
    );
  }

  /// 在源图像的副本上按顺序绘制所有检测结果
  pub fn annotate<T: WithLabel>(
    &self,
    image: &RgbImage,
    detections: &[LabeledDetection<T>],
  ) -> RgbImage {
    let mut canvas = image.clone();
    for item in detections {
      let bbox = &item.detection.bbox;
      self.draw_bbox(&mut canvas, bbox);
      self.draw_label(&mut canvas, bbox, &label_text(item));
    }
    canvas
  }
}
