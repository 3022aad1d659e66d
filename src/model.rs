// 该文件是 Shibie （识别） 项目的一部分。
// src/model.rs - 模型与检测结果
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

use serde::{Deserialize, Serialize};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 归一化图像坐标下的边界框（左上角 + 宽高）
///
/// 数值按构造方式落在 0..1 附近，但不做强制约束。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
  pub left: f32,
  pub top: f32,
  pub width: f32,
  pub height: f32,
}

impl BoundingBox {
  pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
    Self {
      left,
      top,
      width,
      height,
    }
  }

  pub fn right(&self) -> f32 {
    self.left + self.width
  }

  pub fn bottom(&self) -> f32 {
    self.top + self.height
  }

  pub fn area(&self) -> f32 {
    self.width * self.height
  }

  /// 边界框中心点 `(x, y)`
  pub fn center(&self) -> (f32, f32) {
    (self.left + 0.5 * self.width, self.top + 0.5 * self.height)
  }
}

/// 最终的检测结果条目
///
/// JSON 形式与云端识别服务返回的条目保持一致：
/// `{"probability", "tagName", "boundingBox"}`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
  pub probability: f32,
  #[serde(rename = "tagName")]
  pub class_name: String,
  #[serde(rename = "tagIndex", default)]
  pub class_id: usize,
  pub bounding_box: BoundingBox,
}

impl Prediction {
  pub fn center(&self) -> (f32, f32) {
    self.bounding_box.center()
  }
}

/// 一帧的检测结果，按置信度降序排列
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectResult {
  pub predictions: Box<[Prediction]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.predictions.is_empty()
  }

  pub fn len(&self) -> usize {
    self.predictions.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Prediction> {
    self.predictions.iter()
  }

  /// 丢弃置信度低于 `min_probability` 的条目，保留原有顺序
  pub fn retain_min_probability(self, min_probability: f32) -> Self {
    let predictions: Vec<Prediction> = self
      .predictions
      .into_vec()
      .into_iter()
      .filter(|p| p.probability >= min_probability)
      .collect();
    Self {
      predictions: predictions.into_boxed_slice(),
    }
  }
}

impl From<Vec<Prediction>> for DetectResult {
  fn from(predictions: Vec<Prediction>) -> Self {
    Self {
      predictions: predictions.into_boxed_slice(),
    }
  }
}

impl<'a> IntoIterator for &'a DetectResult {
  type Item = &'a Prediction;
  type IntoIter = std::slice::Iter<'a, Prediction>;

  fn into_iter(self) -> Self::IntoIter {
    self.predictions.iter()
  }
}

pub mod anchors;
pub mod config;
pub mod decode;
pub mod math;
pub mod suppress;

mod custom_vision;
pub use self::anchors::{AnchorTable, CUSTOM_VISION_ANCHORS};
pub use self::config::{ConfigError, DetectorConfig, DetectorConfigBuilder, Labels};
pub use self::custom_vision::{CustomVision, CustomVisionBuilder, CustomVisionError};
pub use self::decode::{Candidate, GridLayout, LayoutError, decode};
pub use self::suppress::suppress;

#[cfg(test)]
mod tests {
  use super::*;

  fn prediction(probability: f32, name: &str) -> Prediction {
    Prediction {
      probability,
      class_name: name.to_string(),
      class_id: 0,
      bounding_box: BoundingBox::new(0.25, 0.5, 0.5, 0.25),
    }
  }

  #[test]
  fn center_of_box() {
    let p = prediction(0.9, "aircraft");
    assert_eq!(p.center(), (0.5, 0.625));
  }

  #[test]
  fn json_uses_cloud_field_names() {
    let value = serde_json::to_value(prediction(0.5, "aircraft")).unwrap();
    assert_eq!(value["tagName"], "aircraft");
    assert_eq!(value["probability"], 0.5);
    assert_eq!(value["boundingBox"]["left"], 0.25);
    assert_eq!(value["boundingBox"]["height"], 0.25);
  }

  #[test]
  fn parses_cloud_response_without_index() {
    let text = r#"{"predictions":[{"probability":0.8,"tagName":"toy",
      "boundingBox":{"left":0.1,"top":0.2,"width":0.3,"height":0.4}}]}"#;
    let result: DetectResult = serde_json::from_str(text).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.predictions[0].class_name, "toy");
    assert_eq!(result.predictions[0].class_id, 0);
  }

  #[test]
  fn retain_min_probability_keeps_order() {
    let result = DetectResult::from(vec![
      prediction(0.9, "a"),
      prediction(0.6, "b"),
      prediction(0.7, "c"),
    ])
    .retain_min_probability(0.7);
    let names: Vec<_> = result.iter().map(|p| p.class_name.as_str()).collect();
    assert_eq!(names, ["a", "c"]);
  }
}
