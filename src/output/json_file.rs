// 该文件是 Shibie （识别） 项目的一部分。
// src/output/json_file.rs - JSON 文件输出
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

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, model::DetectResult, output::Render, tensor::OutputTensor, url_path,
};

#[derive(Error, Debug)]
pub enum JsonFileOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 把最近一帧的检测结果写成 JSON 文件，每帧覆盖一次
pub struct JsonFileOutput {
  path: PathBuf,
}

impl FromUrlWithScheme for JsonFileOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonFileOutput {
  type Error = JsonFileOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(JsonFileOutputError::SchemeMismatch);
    }

    Ok(JsonFileOutput {
      path: PathBuf::from(url_path(url)),
    })
  }
}

impl JsonFileOutput {
  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Render<OutputTensor, DetectResult> for JsonFileOutput {
  type Error = JsonFileOutputError;

  fn render_result(&self, _frame: &OutputTensor, result: &DetectResult) -> Result<(), Self::Error> {
    if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(result)?;
    std::fs::write(&self.path, text)?;
    debug!("写入 {} 个结果到 {}", result.len(), self.path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{BoundingBox, Prediction};

  #[test]
  fn writes_cloud_style_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out/result.json");
    let url = Url::parse(&format!("json://{}", path.display())).unwrap();
    let output = JsonFileOutput::from_url(&url).unwrap();
    assert_eq!(output.path(), path.as_path());

    let result = DetectResult::from(vec![Prediction {
      probability: 0.75,
      class_name: "aircraft".to_string(),
      class_id: 0,
      bounding_box: BoundingBox::new(0.5, 0.25, 0.125, 0.25),
    }]);
    let frame = OutputTensor::filled([1, 6, 1, 1], 0.0).unwrap();
    output.render_result(&frame, &result).unwrap();

    let value: serde_json::Value =
      serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["predictions"][0]["tagName"], "aircraft");
    assert_eq!(value["predictions"][0]["boundingBox"]["width"], 0.125);

    let back: DetectResult = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(back, result);
  }
}
