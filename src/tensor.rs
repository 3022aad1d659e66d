// 该文件是 Shibie （识别） 项目的一部分。
// src/tensor.rs - 检测网络原始输出张量
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

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TensorError {
  #[error("数据长度不匹配: 形状 {shape:?} 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch {
    shape: [usize; 4],
    expected: usize,
    actual: usize,
  },
  #[error("张量维度必须为 4, 实际为 {0}")]
  Rank(usize),
  #[error("张量形状 {0:?} 元素数量溢出")]
  Overflow(Vec<usize>),
}

/// 检测网络的原始输出，NCHW 排布：`[batch, channels, grid_h, grid_w]`
///
/// 张量由外部推理引擎产生，这里只做只读访问。
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
  shape: [usize; 4],
  data: Box<[f32]>,
}

fn element_count(shape: &[usize]) -> Option<usize> {
  shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

impl OutputTensor {
  pub fn new(shape: [usize; 4], data: Vec<f32>) -> Result<Self, TensorError> {
    let expected = element_count(&shape).ok_or_else(|| TensorError::Overflow(shape.to_vec()))?;
    if data.len() != expected {
      return Err(TensorError::LengthMismatch {
        shape,
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      shape,
      data: data.into_boxed_slice(),
    })
  }

  /// 从任意维度的形状描述构造，维度不为 4 时报错
  pub fn from_dims(dims: &[usize], data: Vec<f32>) -> Result<Self, TensorError> {
    let shape: [usize; 4] = dims.try_into().map_err(|_| TensorError::Rank(dims.len()))?;
    Self::new(shape, data)
  }

  /// 所有元素取同一个值
  pub fn filled(shape: [usize; 4], value: f32) -> Result<Self, TensorError> {
    let len = element_count(&shape).ok_or_else(|| TensorError::Overflow(shape.to_vec()))?;
    Self::new(shape, vec![value; len])
  }

  pub fn shape(&self) -> [usize; 4] {
    self.shape
  }

  pub fn batch(&self) -> usize {
    self.shape[0]
  }

  pub fn channels(&self) -> usize {
    self.shape[1]
  }

  pub fn height(&self) -> usize {
    self.shape[2]
  }

  pub fn width(&self) -> usize {
    self.shape[3]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  /// 读取 `(channel, y, x)` 处的值，batch 固定为 0
  pub fn at(&self, channel: usize, y: usize, x: usize) -> f32 {
    let plane = self.height() * self.width();
    self.data[channel * plane + y * self.width() + x]
  }

  /// 写入 `(channel, y, x)` 处的值
  ///
  /// 后处理只读取张量；这里用于在内存中构造合成的输出张量，
  /// 例如在回放或测试中放置一个高置信度的网格单元。
  pub fn set(&mut self, channel: usize, y: usize, x: usize, value: f32) {
    let plane = self.height() * self.width();
    let width = self.width();
    self.data[channel * plane + y * width + x] = value;
  }
}

impl AsRef<[f32]> for OutputTensor {
  fn as_ref(&self) -> &[f32] {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_wrong_length() {
    let err = OutputTensor::new([1, 2, 2, 2], vec![0.0; 7]).unwrap_err();
    assert_eq!(
      err,
      TensorError::LengthMismatch {
        shape: [1, 2, 2, 2],
        expected: 8,
        actual: 7
      }
    );
  }

  #[test]
  fn rejects_non_4d_dims() {
    assert_eq!(
      OutputTensor::from_dims(&[1, 30, 13], vec![0.0; 390]).unwrap_err(),
      TensorError::Rank(3)
    );
  }

  #[test]
  fn channel_first_indexing() {
    let mut tensor = OutputTensor::filled([1, 3, 2, 4], 0.0).unwrap();
    tensor.set(2, 1, 3, 7.5);
    // channel * (h * w) + y * w + x
    assert_eq!(tensor.as_slice()[2 * 8 + 4 + 3], 7.5);
    assert_eq!(tensor.at(2, 1, 3), 7.5);
    assert_eq!(tensor.channels(), 3);
    assert_eq!(tensor.height(), 2);
    assert_eq!(tensor.width(), 4);
  }
}
