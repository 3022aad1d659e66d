// 该文件是 Shibie （识别） 项目的一部分。
// src/model/custom_vision.rs - 导出的目标检测模型后处理
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

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{
    AnchorTable, ConfigError, DetectResult, DetectorConfig, GridLayout, Labels, LayoutError, Model,
    config::{DEFAULT_IOU_THRESHOLD, DEFAULT_MAX_DETECTIONS, DEFAULT_PROBABILITY_THRESHOLD},
    decode::decode_with_layout,
    suppress,
  },
  tensor::OutputTensor,
  url_path,
};

#[derive(Error, Debug)]
pub enum CustomVisionError {
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("模型输出与检测器配置不匹配: {0}")]
  Layout(#[from] LayoutError),
  #[error("URI 方案不匹配: 期望 {expected}, 实际 {found}")]
  SchemeMismatch { expected: &'static str, found: String },
}

/// 单输出 YOLO 检测头的后处理器
///
/// 模型推理由外部引擎完成，这里只接收原始输出张量，依次做网格解码和非极大值抑制。
/// 不持有任何跨帧状态，可以在多个线程间共享。
#[derive(Debug, Clone)]
pub struct CustomVision {
  anchors: AnchorTable,
  config: DetectorConfig,
}

impl CustomVision {
  pub fn new(anchors: AnchorTable, config: DetectorConfig) -> Self {
    Self { anchors, config }
  }

  pub fn anchors(&self) -> &AnchorTable {
    &self.anchors
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  /// 解码 + 抑制
  ///
  /// 张量形状与配置不匹配时 panic；需要错误返回时使用 [`Model::infer`]。
  pub fn postprocess(&self, output: &OutputTensor) -> DetectResult {
    let candidates = super::decode(output, &self.anchors, &self.config);
    suppress(candidates, &self.config).into()
  }
}

impl Model for CustomVision {
  type Input = OutputTensor;
  type Output = DetectResult;
  type Error = CustomVisionError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let layout = GridLayout::new(input, &self.anchors, self.config.num_classes()).map_err(|e| {
      error!("输出张量 {:?} 无法解码: {}", input.shape(), e);
      e
    })?;

    let candidates = decode_with_layout(input, &self.anchors, &self.config, &layout);
    let result: DetectResult = suppress(candidates, &self.config).into();
    debug!("检测到 {} 个物体", result.len());
    Ok(result)
  }
}

pub struct CustomVisionBuilder {
  labels: Labels,
  anchors: AnchorTable,
  max_detections: usize,
  probability_threshold: f32,
  iou_threshold: f32,
}

impl FromUrlWithScheme for CustomVisionBuilder {
  const SCHEME: &'static str = "customvision";
}

fn parse_query<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
  value
    .parse()
    .map_err(|_| ConfigError::Parse(name, value.to_string()))
}

impl FromUrl for CustomVisionBuilder {
  type Error = CustomVisionError;

  /// `customvision:///path/labels.txt?max_detections=20&probability=0.1&iou=0.45&anchors=...`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(CustomVisionError::SchemeMismatch {
        expected: Self::SCHEME,
        found: url.scheme().to_string(),
      });
    }

    let path = url_path(url);
    info!("加载标签文件: {}", path);
    let labels = Labels::from_file(&path)?;

    let mut builder = Self::new(labels);
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "max_detections" => builder.max_detections = parse_query("max_detections", &value)?,
        "probability" => builder.probability_threshold = parse_query("probability", &value)?,
        "iou" => builder.iou_threshold = parse_query("iou", &value)?,
        "anchors" => builder.anchors = value.parse()?,
        other => debug!("忽略未知参数: {}", other),
      }
    }

    Ok(builder)
  }
}

impl CustomVisionBuilder {
  pub fn new(labels: Labels) -> Self {
    Self {
      labels,
      anchors: AnchorTable::custom_vision(),
      max_detections: DEFAULT_MAX_DETECTIONS,
      probability_threshold: DEFAULT_PROBABILITY_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
    }
  }

  pub fn anchors(mut self, anchors: AnchorTable) -> Self {
    self.anchors = anchors;
    self
  }

  pub fn max_detections(mut self, max_detections: usize) -> Self {
    self.max_detections = max_detections;
    self
  }

  pub fn probability_threshold(mut self, threshold: f32) -> Self {
    self.probability_threshold = threshold;
    self
  }

  pub fn iou_threshold(mut self, threshold: f32) -> Self {
    self.iou_threshold = threshold;
    self
  }

  pub fn build(self) -> Result<CustomVision, CustomVisionError> {
    let config = DetectorConfig::builder(self.labels)
      .max_detections(self.max_detections)
      .probability_threshold(self.probability_threshold)
      .iou_threshold(self.iou_threshold)
      .build()?;

    info!(
      "检测器就绪: {} 个类别, {} 个锚框, 最多 {} 个结果, 概率阈值 {}, IoU 阈值 {}",
      config.num_classes(),
      self.anchors.len(),
      config.max_detections(),
      config.probability_threshold(),
      config.iou_threshold()
    );

    Ok(CustomVision::new(self.anchors, config))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn labels_url(dir: &tempfile::TempDir, query: &str) -> Url {
    let path = dir.path().join("labels.txt");
    std::fs::write(&path, "aircraft\ncar\n").unwrap();
    Url::parse(&format!("customvision://{}?{}", path.display(), query)).unwrap()
  }

  #[test]
  fn builder_from_url_reads_query() {
    let dir = tempfile::tempdir().unwrap();
    let url = labels_url(&dir, "max_detections=5&probability=0.3&iou=0.3&anchors=1,1,2,2");
    let detector = CustomVisionBuilder::from_url(&url).unwrap().build().unwrap();
    assert_eq!(detector.config().max_detections(), 5);
    assert_eq!(detector.config().probability_threshold(), 0.3);
    assert_eq!(detector.config().iou_threshold(), 0.3);
    assert_eq!(detector.config().num_classes(), 2);
    assert_eq!(detector.anchors().len(), 2);
  }

  #[test]
  fn builder_from_url_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let detector = CustomVisionBuilder::from_url(&labels_url(&dir, ""))
      .unwrap()
      .build()
      .unwrap();
    assert_eq!(detector.config().max_detections(), 20);
    assert_eq!(detector.anchors(), &AnchorTable::custom_vision());
  }

  #[test]
  fn builder_rejects_other_scheme() {
    let url = Url::parse("file:///tmp/labels.txt").unwrap();
    assert!(matches!(
      CustomVisionBuilder::from_url(&url),
      Err(CustomVisionError::SchemeMismatch { .. })
    ));
  }

  #[test]
  fn builder_rejects_bad_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let builder = CustomVisionBuilder::from_url(&labels_url(&dir, "iou=abc"));
    assert!(matches!(
      builder,
      Err(CustomVisionError::Config(ConfigError::Parse("iou", _)))
    ));
  }

  #[test]
  fn infer_reports_layout_mismatch() {
    let detector = CustomVisionBuilder::new(Labels::new(["a"])).build().unwrap();
    let tensor = OutputTensor::filled([1, 35, 13, 13], 0.0).unwrap();
    assert!(matches!(
      detector.infer(&tensor),
      Err(CustomVisionError::Layout(LayoutError::ClassCount {
        classes: 2,
        labels: 1
      }))
    ));
  }
}
