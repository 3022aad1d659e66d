// 该文件是 Shibie （识别） 项目的一部分。
// src/input/tensor_directory.rs - 张量目录输入
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

use std::{collections::VecDeque, path::PathBuf};

use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::tensor_file::{TensorFileInputError, read_tensor_file, shape_from_query},
  tensor::OutputTensor,
  url_path,
};

/// 按文件名顺序逐个读取目录下的张量文件
///
/// 读取失败的文件记录错误后跳过，不会中断整个输入流。
pub struct TensorDirectoryInput {
  files: VecDeque<PathBuf>,
  shape: Option<[usize; 4]>,
}

impl FromUrlWithScheme for TensorDirectoryInput {
  const SCHEME: &'static str = "tensors";
}

impl FromUrl for TensorDirectoryInput {
  type Error = TensorFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(TensorFileInputError::SchemeMismatch);
    }

    let directory = PathBuf::from(url_path(url));
    let mut files = Vec::new();
    for entry in std::fs::read_dir(&directory)? {
      let path = entry?.path();
      if path.is_file() {
        files.push(path);
      }
    }
    files.sort();

    info!("张量目录 {}: {} 个文件", directory.display(), files.len());
    if files.is_empty() {
      warn!("张量目录 {} 为空", directory.display());
    }

    Ok(TensorDirectoryInput {
      files: files.into(),
      shape: shape_from_query(url)?,
    })
  }
}

impl TensorDirectoryInput {
  pub fn remaining(&self) -> usize {
    self.files.len()
  }
}

impl Iterator for TensorDirectoryInput {
  type Item = OutputTensor;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(path) = self.files.pop_front() {
      match read_tensor_file(&path, self.shape) {
        Ok(tensor) => return Some(tensor),
        Err(e) => error!("读取张量文件 {} 失败, 跳过: {}", path.display(), e),
      }
    }
    None
  }
}
