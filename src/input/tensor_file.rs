// 该文件是 Shibie （识别） 项目的一部分。
// src/input/tensor_file.rs - 张量文件输入
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

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  tensor::{OutputTensor, TensorError},
  url_path,
};

#[derive(Error, Debug)]
pub enum TensorFileInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("张量错误: {0}")]
  TensorError(#[from] TensorError),
  #[error("原始张量文件需要 shape 参数: {0}")]
  MissingShape(PathBuf),
  #[error("无法解析形状: {0}")]
  InvalidShape(String),
  #[error("原始张量文件长度 {0} 不是 4 的倍数")]
  RawLength(usize),
}

/// JSON 张量文件：`{"shape": [1, C, H, W], "data": [...]}`
#[derive(Deserialize)]
struct TensorDocument {
  shape: Vec<usize>,
  data: Vec<f32>,
}

/// 解析 `1,30,13,13` 形式的形状
pub fn parse_shape(text: &str) -> Result<[usize; 4], TensorFileInputError> {
  let dims = text
    .split(',')
    .map(|d| d.trim().parse::<usize>())
    .collect::<Result<Vec<_>, _>>()
    .map_err(|_| TensorFileInputError::InvalidShape(text.to_string()))?;
  dims
    .try_into()
    .map_err(|_| TensorFileInputError::InvalidShape(text.to_string()))
}

pub(crate) fn shape_from_query(url: &Url) -> Result<Option<[usize; 4]>, TensorFileInputError> {
  url
    .query_pairs()
    .find(|(k, _)| k == "shape")
    .map(|(_, v)| parse_shape(&v))
    .transpose()
}

/// 读取一个张量文件
///
/// `.json` 文件自带形状；其它文件按小端 f32 原始数据读取，需要给出 `shape`。
pub fn read_tensor_file(
  path: &Path,
  shape: Option<[usize; 4]>,
) -> Result<OutputTensor, TensorFileInputError> {
  let is_json = path
    .extension()
    .map(|e| e.eq_ignore_ascii_case("json"))
    .unwrap_or(false);

  let tensor = if is_json {
    let text = std::fs::read_to_string(path)?;
    let document: TensorDocument = serde_json::from_str(&text)?;
    OutputTensor::from_dims(&document.shape, document.data)?
  } else {
    let shape = shape.ok_or_else(|| TensorFileInputError::MissingShape(path.to_path_buf()))?;
    let bytes = std::fs::read(path)?;
    if bytes.len() % 4 != 0 {
      return Err(TensorFileInputError::RawLength(bytes.len()));
    }
    let data = bytes
      .chunks_exact(4)
      .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
      .collect();
    OutputTensor::new(shape, data)?
  };

  debug!("读取张量 {}: 形状 {:?}", path.display(), tensor.shape());
  Ok(tensor)
}

/// 单个张量文件输入，只产生一帧
pub struct TensorFileInput {
  tensor: Option<OutputTensor>,
}

impl FromUrlWithScheme for TensorFileInput {
  const SCHEME: &'static str = "tensor";
}

impl FromUrl for TensorFileInput {
  type Error = TensorFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(TensorFileInputError::SchemeMismatch);
    }

    let path = PathBuf::from(url_path(url));
    info!("打开张量文件: {}", path.display());
    let tensor = read_tensor_file(&path, shape_from_query(url)?)?;

    Ok(TensorFileInput {
      tensor: Some(tensor),
    })
  }
}

impl From<OutputTensor> for TensorFileInput {
  fn from(tensor: OutputTensor) -> Self {
    Self {
      tensor: Some(tensor),
    }
  }
}

impl Iterator for TensorFileInput {
  type Item = OutputTensor;

  fn next(&mut self) -> Option<Self::Item> {
    self.tensor.take()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn write_raw(path: &Path, values: &[f32]) {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    std::fs::write(path, bytes).unwrap();
  }

  #[test]
  fn parses_shape() {
    assert_eq!(parse_shape("1, 30,13,13").unwrap(), [1, 30, 13, 13]);
    assert!(matches!(
      parse_shape("1,30,13"),
      Err(TensorFileInputError::InvalidShape(_))
    ));
    assert!(parse_shape("1,x,2,2").is_err());
  }

  #[test]
  fn reads_raw_file_with_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    write_raw(&path, &[0.5, -1.0, 2.0, 3.0]);

    let url = Url::parse(&format!("tensor://{}?shape=1,1,2,2", path.display())).unwrap();
    let mut input = TensorFileInput::from_url(&url).unwrap();
    let tensor = input.next().unwrap();
    assert_eq!(tensor.shape(), [1, 1, 2, 2]);
    assert_eq!(tensor.at(0, 1, 0), 2.0);
    assert!(input.next().is_none());
  }

  #[test]
  fn raw_file_requires_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    write_raw(&path, &[0.0; 4]);
    assert!(matches!(
      read_tensor_file(&path, None),
      Err(TensorFileInputError::MissingShape(_))
    ));
  }

  #[test]
  fn raw_file_length_must_match_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    write_raw(&path, &[0.0; 3]);
    assert!(matches!(
      read_tensor_file(&path, Some([1, 1, 2, 2])),
      Err(TensorFileInputError::TensorError(_))
    ));

    std::fs::write(&path, [0u8; 5]).unwrap();
    assert!(matches!(
      read_tensor_file(&path, Some([1, 1, 1, 1])),
      Err(TensorFileInputError::RawLength(5))
    ));
  }

  #[test]
  fn reads_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.json");
    std::fs::write(&path, r#"{"shape":[1,2,1,1],"data":[0.25,0.75]}"#).unwrap();
    let tensor = read_tensor_file(&path, None).unwrap();
    assert_eq!(tensor.shape(), [1, 2, 1, 1]);
    assert_eq!(tensor.as_slice(), &[0.25, 0.75]);
  }

  #[test]
  fn json_file_must_be_4d() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.json");
    std::fs::write(&path, r#"{"shape":[2,1],"data":[0.25,0.75]}"#).unwrap();
    assert!(matches!(
      read_tensor_file(&path, None),
      Err(TensorFileInputError::TensorError(TensorError::Rank(2)))
    ));
  }
}
