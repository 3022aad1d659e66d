// 该文件是 Shibie （识别） 项目的一部分。
// src/model/anchors.rs - 锚框表
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

use crate::model::config::ConfigError;

/// 导出的目标检测模型内置的 5 组锚框（宽, 高），单位为网格单元
pub const CUSTOM_VISION_ANCHORS: [f32; 10] = [
  0.573, 0.677, 1.87, 2.06, 3.34, 5.47, 7.88, 3.53, 9.77, 9.17,
];

/// 按顺序排列的锚框 `(宽, 高)` 表，模型生命周期内不变
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorTable {
  pairs: Box<[(f32, f32)]>,
}

impl AnchorTable {
  /// 从扁平数组 `[w0, h0, w1, h1, ...]` 构造，长度必须为非零偶数
  pub fn from_flat(values: &[f32]) -> Result<Self, ConfigError> {
    if values.is_empty() || values.len() % 2 != 0 {
      return Err(ConfigError::AnchorLength(values.len()));
    }
    if let Some(v) = values.iter().find(|v| !v.is_finite() || **v <= 0.0) {
      return Err(ConfigError::AnchorValue(*v));
    }

    let pairs: Vec<(f32, f32)> = values.chunks_exact(2).map(|p| (p[0], p[1])).collect();
    Ok(Self {
      pairs: pairs.into_boxed_slice(),
    })
  }

  pub fn custom_vision() -> Self {
    let pairs: Vec<(f32, f32)> = CUSTOM_VISION_ANCHORS
      .chunks_exact(2)
      .map(|p| (p[0], p[1]))
      .collect();
    Self {
      pairs: pairs.into_boxed_slice(),
    }
  }

  pub fn len(&self) -> usize {
    self.pairs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.pairs.is_empty()
  }

  pub fn get(&self, index: usize) -> (f32, f32) {
    self.pairs[index]
  }

  pub fn iter(&self) -> std::slice::Iter<'_, (f32, f32)> {
    self.pairs.iter()
  }
}

impl Default for AnchorTable {
  fn default() -> Self {
    Self::custom_vision()
  }
}

impl std::str::FromStr for AnchorTable {
  type Err = ConfigError;

  /// 逗号分隔的扁平数组，例如 `0.5,0.5,1.0,2.0`
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let values = s
      .split(',')
      .map(|v| {
        v.trim()
          .parse::<f32>()
          .map_err(|_| ConfigError::Parse("anchors", v.trim().to_string()))
      })
      .collect::<Result<Vec<_>, _>>()?;
    Self::from_flat(&values)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builtin_table_has_five_anchors() {
    let table = AnchorTable::custom_vision();
    assert_eq!(table.len(), 5);
    assert_eq!(table.get(0), (0.573, 0.677));
    assert_eq!(table.get(4), (9.77, 9.17));
  }

  #[test]
  fn odd_length_is_rejected() {
    assert!(matches!(
      AnchorTable::from_flat(&[1.0, 2.0, 3.0]),
      Err(ConfigError::AnchorLength(3))
    ));
    assert!(matches!(
      AnchorTable::from_flat(&[]),
      Err(ConfigError::AnchorLength(0))
    ));
  }

  #[test]
  fn parses_from_string() {
    let table: AnchorTable = "1, 2,3.5,4".parse().unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.get(1), (3.5, 4.0));
    assert!("1,x".parse::<AnchorTable>().is_err());
    assert!("1,-2".parse::<AnchorTable>().is_err());
  }
}
