// 该文件是 Shibie （识别） 项目的一部分。
// src/output/log_output.rs - 日志输出
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
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, model::DetectResult, output::Render, tensor::OutputTensor,
};

#[derive(Error, Debug)]
pub enum LogOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("无法解析 min_probability: {0}")]
  InvalidMinProbability(String),
}

/// 把检测结果写入日志，`log://?min_probability=0.7` 可以过滤低置信度结果
pub struct LogOutput {
  min_probability: f32,
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = LogOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(LogOutputError::SchemeMismatch);
    }

    let min_probability = match url.query_pairs().find(|(k, _)| k == "min_probability") {
      Some((_, v)) => v
        .parse()
        .map_err(|_| LogOutputError::InvalidMinProbability(v.to_string()))?,
      None => 0.0,
    };

    Ok(LogOutput { min_probability })
  }
}

impl LogOutput {
  pub fn new(min_probability: f32) -> Self {
    Self { min_probability }
  }

  pub fn min_probability(&self) -> f32 {
    self.min_probability
  }
}

impl Render<OutputTensor, DetectResult> for LogOutput {
  type Error = LogOutputError;

  fn render_result(&self, frame: &OutputTensor, result: &DetectResult) -> Result<(), Self::Error> {
    let result = result.clone().retain_min_probability(self.min_probability);
    info!("输出张量 {:?}: {} 个结果", frame.shape(), result.len());
    for prediction in &result {
      let (cx, cy) = prediction.center();
      let bbox = &prediction.bounding_box;
      info!(
        "  - {}: {:.2}% 中心 ({:.3}, {:.3}) 框 ({:.3}, {:.3}, {:.3}x{:.3})",
        prediction.class_name,
        prediction.probability * 100.0,
        cx,
        cy,
        bbox.left,
        bbox.top,
        bbox.width,
        bbox.height
      );
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_min_probability() {
    let output = LogOutput::from_url(&Url::parse("log://?min_probability=0.7").unwrap()).unwrap();
    assert_eq!(output.min_probability(), 0.7);

    let output = LogOutput::from_url(&Url::parse("log://").unwrap()).unwrap();
    assert_eq!(output.min_probability(), 0.0);

    assert!(matches!(
      LogOutput::from_url(&Url::parse("log://?min_probability=high").unwrap()),
      Err(LogOutputError::InvalidMinProbability(_))
    ));
  }

  #[test]
  fn renders_without_error() {
    let frame = OutputTensor::filled([1, 6, 1, 1], 0.0).unwrap();
    LogOutput::new(0.5)
      .render_result(&frame, &DetectResult::default())
      .unwrap();
  }
}
