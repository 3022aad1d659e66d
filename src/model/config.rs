// 该文件是 Shibie （识别） 项目的一部分。
// src/model/config.rs - 检测器配置
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

use std::path::Path;

use thiserror::Error;
use tracing::debug;

pub const DEFAULT_MAX_DETECTIONS: usize = 20;
pub const DEFAULT_PROBABILITY_THRESHOLD: f32 = 0.1;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("标签列表为空")]
  EmptyLabels,
  #[error("{0} 必须位于 (0, 1) 区间内, 实际为 {1}")]
  ThresholdRange(&'static str, f32),
  #[error("锚框数组长度必须为非零偶数, 实际为 {0}")]
  AnchorLength(usize),
  #[error("锚框尺寸必须为正数, 实际为 {0}")]
  AnchorValue(f32),
  #[error("无法解析参数 {0}: {1}")]
  Parse(&'static str, String),
  #[error("标签文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按类别索引排列的类别名称
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
  names: Box<[String]>,
}

impl Labels {
  pub fn new<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let names: Vec<String> = names.into_iter().map(Into::into).collect();
    Self {
      names: names.into_boxed_slice(),
    }
  }

  /// 读取 `labels.txt`：每行一个标签，忽略空行与首尾空白
  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let labels: Self = text.parse()?;
    debug!(
      "从 {} 读取 {} 个标签",
      path.as_ref().display(),
      labels.len()
    );
    Ok(labels)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn name(&self, class_id: usize) -> Option<&str> {
    self.names.get(class_id).map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.names.iter().map(String::as_str)
  }
}

impl std::str::FromStr for Labels {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(Labels::new(
      s.lines().map(str::trim).filter(|line| !line.is_empty()),
    ))
  }
}

/// 检测器配置，构造后不再改变
#[derive(Debug, Clone)]
pub struct DetectorConfig {
  labels: Labels,
  max_detections: usize,
  probability_threshold: f32,
  iou_threshold: f32,
}

impl DetectorConfig {
  pub fn builder(labels: Labels) -> DetectorConfigBuilder {
    DetectorConfigBuilder {
      labels,
      max_detections: DEFAULT_MAX_DETECTIONS,
      probability_threshold: DEFAULT_PROBABILITY_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
    }
  }

  pub fn labels(&self) -> &Labels {
    &self.labels
  }

  pub fn num_classes(&self) -> usize {
    self.labels.len()
  }

  pub fn max_detections(&self) -> usize {
    self.max_detections
  }

  pub fn probability_threshold(&self) -> f32 {
    self.probability_threshold
  }

  pub fn iou_threshold(&self) -> f32 {
    self.iou_threshold
  }
}

pub struct DetectorConfigBuilder {
  labels: Labels,
  max_detections: usize,
  probability_threshold: f32,
  iou_threshold: f32,
}

fn check_unit_interval(name: &'static str, value: f32) -> Result<f32, ConfigError> {
  if value > 0.0 && value < 1.0 {
    Ok(value)
  } else {
    Err(ConfigError::ThresholdRange(name, value))
  }
}

impl DetectorConfigBuilder {
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

  pub fn build(self) -> Result<DetectorConfig, ConfigError> {
    if self.labels.is_empty() {
      return Err(ConfigError::EmptyLabels);
    }

    Ok(DetectorConfig {
      probability_threshold: check_unit_interval(
        "probability_threshold",
        self.probability_threshold,
      )?,
      iou_threshold: check_unit_interval("iou_threshold", self.iou_threshold)?,
      max_detections: self.max_detections,
      labels: self.labels,
    })
  }
}
