// 该文件是 Citodet （细胞检测） 项目的一部分。
// src/model/normalize.rs - 检测结果归一化
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

use tracing::debug;

use crate::model::{
  BoundingBox, ClassIndex, Detection, TwoStageOutput, XyxyRows, YoloResults, round_confidence,
};

/// 两阶段模型的最低置信度，低于该值的结果被丢弃
pub const TWO_STAGE_SCORE_THRESHOLD: f32 = 0.30;

/// 把模型族特有的原始输出转换为统一的检测结果
///
/// 输出保持模型的发射顺序，不重新排序。
pub trait Normalizer {
  type Raw;

  fn normalize(&self, raw: &Self::Raw) -> Vec<Detection>;
}

fn class_index(raw_label: i64, label_offset: i64) -> ClassIndex {
  ClassIndex(raw_label - label_offset)
}

/// 单阶段 A：逐行转换
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleStageRowsNormalizer {
  label_offset: i64,
}

impl SingleStageRowsNormalizer {
  pub fn new(label_offset: i64) -> Self {
    Self { label_offset }
  }
}

impl Normalizer for SingleStageRowsNormalizer {
  type Raw = XyxyRows;

  fn normalize(&self, raw: &Self::Raw) -> Vec<Detection> {
    raw
      .rows
      .iter()
      .map(|&[x1, y1, x2, y2, conf, cls]| Detection {
        bbox: BoundingBox::from_xyxy([x1, y1, x2, y2]),
        class: class_index(cls as i64, self.label_offset),
        confidence: round_confidence(conf),
      })
      .collect()
  }
}

/// 单阶段 B：展开每个结果对象中的所有框
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleStageResultsNormalizer {
  label_offset: i64,
}

impl SingleStageResultsNormalizer {
  pub fn new(label_offset: i64) -> Self {
    Self { label_offset }
  }
}

impl Normalizer for SingleStageResultsNormalizer {
  type Raw = YoloResults;

  fn normalize(&self, raw: &Self::Raw) -> Vec<Detection> {
    raw
      .results
      .iter()
      .flat_map(|result| result.boxes.iter())
      .map(|b| Detection {
        bbox: BoundingBox::from_xyxy(b.xyxy),
        class: class_index(b.cls as i64, self.label_offset),
        confidence: round_confidence(b.conf),
      })
      .collect()
  }
}

/// 两阶段：按位置遍历，丢弃低置信度结果并校正标签偏移
///
/// 偏移后的索引原样保留，即使落在类别表之外；越界由标签解析报告。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwoStageNormalizer {
  label_offset: i64,
}

impl TwoStageNormalizer {
  pub fn new(label_offset: i64) -> Self {
    Self { label_offset }
  }
}

impl Normalizer for TwoStageNormalizer {
  type Raw = TwoStageOutput;

  fn normalize(&self, raw: &Self::Raw) -> Vec<Detection> {
    let detections: Vec<Detection> = raw
      .boxes
      .iter()
      .zip(&raw.scores)
      .zip(&raw.labels)
      .filter(|&((_, &score), _)| score >= TWO_STAGE_SCORE_THRESHOLD)
      .map(|((&xyxy, &score), &label)| Detection {
        bbox: BoundingBox::from_xyxy(xyxy),
        class: class_index(label, self.label_offset),
        confidence: round_confidence(score),
      })
      .collect();

    debug!(
      "两阶段输出 {} 个候选，保留 {} 个",
      raw.scores.len(),
      detections.len()
    );
    detections
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{YoloBox, YoloResult};

  fn two_stage(scores: &[f32], labels: &[i64]) -> TwoStageOutput {
    TwoStageOutput {
      boxes: scores
        .iter()
        .enumerate()
        .map(|(i, _)| {
          let o = i as f32 * 10.0;
          [o, o, o + 20.5, o + 20.5]
        })
        .collect(),
      scores: scores.to_vec(),
      labels: labels.to_vec(),
    }
  }

  #[test]
  fn rows_map_one_to_one_in_order() {
    let raw = XyxyRows {
      rows: vec![
        [10.7, 10.2, 50.9, 50.1, 0.914, 4.0],
        [1.0, 2.0, 3.0, 4.0, 0.5, 0.0],
        [5.0, 6.0, 7.0, 8.0, 0.256, 5.0],
      ],
    };
    let detections = SingleStageRowsNormalizer::new(0).normalize(&raw);
    assert_eq!(detections.len(), 3);
    assert_eq!(
      detections[0].bbox,
      BoundingBox {
        x1: 10,
        y1: 10,
        x2: 50,
        y2: 50
      }
    );
    assert_eq!(detections[0].class, ClassIndex(4));
    assert_eq!(detections[0].confidence, 0.91);
    assert_eq!(detections[1].class, ClassIndex(0));
    assert_eq!(detections[2].class, ClassIndex(5));
    assert_eq!(detections[2].confidence, 0.26);
  }

  #[test]
  fn results_flatten_all_boxes() {
    let raw = YoloResults {
      results: vec![
        YoloResult {
          boxes: vec![
            YoloBox {
              cls: 2.0,
              conf: 0.81,
              xyxy: [0.0, 0.0, 10.0, 10.0],
            },
            YoloBox {
              cls: 3.0,
              conf: 0.42,
              xyxy: [5.0, 5.0, 15.0, 15.0],
            },
          ],
        },
        YoloResult { boxes: vec![] },
        YoloResult {
          boxes: vec![YoloBox {
            cls: 1.0,
            conf: 0.26,
            xyxy: [1.0, 1.0, 2.0, 2.0],
          }],
        },
      ],
    };
    let detections = SingleStageResultsNormalizer::new(0).normalize(&raw);
    let classes: Vec<_> = detections.iter().map(|d| d.class.0).collect();
    assert_eq!(classes, vec![2, 3, 1]);
  }

  #[test]
  fn empty_outputs_give_empty_detections() {
    assert!(
      SingleStageRowsNormalizer::new(0)
        .normalize(&XyxyRows::default())
        .is_empty()
    );
    assert!(
      SingleStageResultsNormalizer::new(0)
        .normalize(&YoloResults::default())
        .is_empty()
    );
    assert!(
      TwoStageNormalizer::new(1)
        .normalize(&TwoStageOutput::default())
        .is_empty()
    );
  }

  #[test]
  fn two_stage_threshold_is_inclusive_at_boundary() {
    let raw = two_stage(&[0.30, 0.2999, 0.95, 0.1], &[1, 2, 3, 4]);
    let detections = TwoStageNormalizer::new(0).normalize(&raw);
    let kept: Vec<_> = detections.iter().map(|d| d.class.0).collect();
    assert_eq!(kept, vec![1, 3]);
    assert_eq!(detections[0].confidence, 0.3);
    assert_eq!(detections[1].bbox.x1, 20);
  }

  #[test]
  fn anchor_family_subtracts_one() {
    let raw = two_stage(&[0.9, 0.8, 0.7], &[1, 5, 6]);
    let proposal = TwoStageNormalizer::new(0).normalize(&raw);
    let anchor = TwoStageNormalizer::new(1).normalize(&raw);
    for (p, a) in proposal.iter().zip(&anchor) {
      assert_eq!(a.class.0, p.class.0 - 1);
      assert_eq!(a.bbox, p.bbox);
      assert_eq!(a.confidence, p.confidence);
    }
  }

  #[test]
  fn anchor_label_zero_surfaces_unclamped() {
    let raw = two_stage(&[0.9], &[0]);
    let detections = TwoStageNormalizer::new(1).normalize(&raw);
    assert_eq!(detections[0].class, ClassIndex(-1));
  }

  #[test]
  fn normalizing_twice_is_identical() {
    let raw = two_stage(&[0.31, 0.5, 0.29, 0.77], &[1, 2, 3, 6]);
    let normalizer = TwoStageNormalizer::new(1);
    assert_eq!(normalizer.normalize(&raw), normalizer.normalize(&raw));
  }

  #[test]
  fn confidences_stay_in_unit_range_with_two_decimals() {
    let raw = two_stage(&[0.30, 0.333_33, 0.999_9, 1.0], &[1, 1, 1, 1]);
    for d in TwoStageNormalizer::new(0).normalize(&raw) {
      assert!((0.0..=1.0).contains(&d.confidence));
      let scaled = d.confidence * 100.0;
      assert!((scaled - scaled.round()).abs() < 1e-9);
    }
  }

  #[test]
  fn mismatched_lengths_stop_at_shortest() {
    let raw = TwoStageOutput {
      boxes: vec![[0.0, 0.0, 1.0, 1.0]; 3],
      scores: vec![0.9, 0.9],
      labels: vec![1, 2, 3],
    };
    assert_eq!(TwoStageNormalizer::new(0).normalize(&raw).len(), 2);
  }
}
