// 该文件是 Citodet （细胞检测） 项目的一部分。
// src/output/report.rs - JSON 结果报告
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

use serde::Serialize;

use crate::{
  model::{LabeledDetection, WithLabel},
  output::OutputError,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
  pub class: String,
  pub confidence: f64,
}

/// 标准输出上唯一的 JSON 值：检测列表或错误，二者互斥
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Report {
  Detections { detections: Vec<ReportEntry> },
  Error { error: String },
}

impl Report {
  /// 按检测顺序生成报告，不含框坐标
  pub fn from_detections<T: WithLabel>(detections: &[LabeledDetection<T>]) -> Self {
    Report::Detections {
      detections: detections
        .iter()
        .map(|item| ReportEntry {
          class: item.label.to_label_str().to_string(),
          confidence: item.detection.confidence,
        })
        .collect(),
    }
  }

  pub fn error(err: impl std::fmt::Display) -> Self {
    Report::Error {
      error: err.to_string(),
    }
  }

  pub fn is_error(&self) -> bool {
    matches!(self, Report::Error { .. })
  }

  pub fn to_json(&self) -> Result<String, OutputError> {
    Ok(serde_json::to_string(self)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{BethesdaLabel, BoundingBox, ClassIndex, Detection};

  fn labeled(label: BethesdaLabel, confidence: f64) -> LabeledDetection {
    LabeledDetection {
      detection: Detection {
        bbox: BoundingBox {
          x1: 1,
          y1: 2,
          x2: 3,
          y2: 4,
        },
        class: ClassIndex(label.to_label_id()),
        confidence,
      },
      label,
    }
  }

  #[test]
  fn detections_serialize_in_order_without_boxes() {
    let report = Report::from_detections(&[
      labeled(BethesdaLabel::Nilm, 0.91),
      labeled(BethesdaLabel::AscH, 0.3),
    ]);
    assert_eq!(
      report.to_json().unwrap(),
      r#"{"detections":[{"class":"NILM","confidence":0.91},{"class":"ASC-H","confidence":0.3}]}"#
    );
    assert!(!report.is_error());
  }

  #[test]
  fn empty_detections_still_have_key() {
    let report = Report::from_detections::<BethesdaLabel>(&[]);
    assert_eq!(report.to_json().unwrap(), r#"{"detections":[]}"#);
  }

  #[test]
  fn error_shape_has_only_error_key() {
    let report = Report::error("Modelo 'x' no soportado");
    assert!(report.is_error());
    let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(value, serde_json::json!({"error": "Modelo 'x' no soportado"}));
  }
}
