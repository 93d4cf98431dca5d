// 该文件是 Citodet （细胞检测） 项目的一部分。
// src/model/label.rs - Bethesda 类别表
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

use std::fmt;

use crate::model::WithLabel;

/// Bethesda 系统类别名称，顺序即模型的类别索引
pub const CLASS_NAMES: [&str; 6] = ["ASC-H", "ASC-US", "HSIL", "LSIL", "NILM", "SCC"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BethesdaLabel {
  AscH,
  AscUs,
  Hsil,
  Lsil,
  Nilm,
  Scc,
}

impl BethesdaLabel {
  pub const ALL: [BethesdaLabel; 6] = [
    BethesdaLabel::AscH,
    BethesdaLabel::AscUs,
    BethesdaLabel::Hsil,
    BethesdaLabel::Lsil,
    BethesdaLabel::Nilm,
    BethesdaLabel::Scc,
  ];
}

impl WithLabel for BethesdaLabel {
  fn to_label_str(&self) -> &'static str {
    CLASS_NAMES[self.to_label_id() as usize]
  }

  fn to_label_id(&self) -> i64 {
    match self {
      BethesdaLabel::AscH => 0,
      BethesdaLabel::AscUs => 1,
      BethesdaLabel::Hsil => 2,
      BethesdaLabel::Lsil => 3,
      BethesdaLabel::Nilm => 4,
      BethesdaLabel::Scc => 5,
    }
  }

  fn from_label_id(id: i64) -> Option<Self> {
    usize::try_from(id)
      .ok()
      .and_then(|idx| Self::ALL.get(idx).copied())
  }
}

impl fmt::Display for BethesdaLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.to_label_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ids_follow_registry_order() {
    for (id, name) in CLASS_NAMES.iter().enumerate() {
      let label = BethesdaLabel::from_label_id(id as i64).unwrap();
      assert_eq!(label.to_label_str(), *name);
      assert_eq!(label.to_label_id(), id as i64);
    }
  }

  #[test]
  fn out_of_range_ids_do_not_wrap() {
    assert_eq!(BethesdaLabel::from_label_id(-1), None);
    assert_eq!(BethesdaLabel::from_label_id(6), None);
  }

  #[test]
  fn display_uses_registry_name() {
    assert_eq!(BethesdaLabel::Nilm.to_string(), "NILM");
    assert_eq!(BethesdaLabel::AscUs.to_string(), "ASC-US");
  }
}
