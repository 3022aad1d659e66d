// 该文件是 Shibie （识别） 项目的一部分。
// src/model/decode.rs - 网格输出解码
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
use tracing::{debug, error};

use crate::{
  model::{
    AnchorTable, BoundingBox, DetectorConfig,
    math::{logistic, scaled_softmax},
  },
  tensor::OutputTensor,
};

/// 每个锚框固定的回归通道数：x, y, w, h, objectness
const BOX_CHANNELS: usize = 5;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LayoutError {
  #[error("batch 大小必须为 1, 实际为 {0}")]
  Batch(usize),
  #[error("锚框表为空")]
  NoAnchors,
  #[error("输出网格为空: {0}x{1}")]
  EmptyGrid(usize, usize),
  #[error("通道数 {channels} 不能被锚框数 {anchors} 整除")]
  ChannelsNotDivisible { channels: usize, anchors: usize },
  #[error("每个锚框的通道数 {0} 少于 5")]
  TooFewChannels(usize),
  #[error("模型输出 {classes} 个类别, 但标签数量为 {labels}")]
  ClassCount { classes: usize, labels: usize },
}

/// 由输出张量形状推导出的网格布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
  pub num_anchors: usize,
  pub num_classes: usize,
  pub grid_height: usize,
  pub grid_width: usize,
}

impl GridLayout {
  /// 检查张量形状与锚框表、标签数量是否匹配
  pub fn new(
    tensor: &OutputTensor,
    anchors: &AnchorTable,
    num_labels: usize,
  ) -> Result<Self, LayoutError> {
    if tensor.batch() != 1 {
      return Err(LayoutError::Batch(tensor.batch()));
    }

    let num_anchors = anchors.len();
    if num_anchors == 0 {
      return Err(LayoutError::NoAnchors);
    }

    let (grid_height, grid_width) = (tensor.height(), tensor.width());
    if grid_height == 0 || grid_width == 0 {
      return Err(LayoutError::EmptyGrid(grid_height, grid_width));
    }

    let channels = tensor.channels();
    if channels % num_anchors != 0 {
      return Err(LayoutError::ChannelsNotDivisible {
        channels,
        anchors: num_anchors,
      });
    }

    let per_anchor = channels / num_anchors;
    if per_anchor < BOX_CHANNELS {
      return Err(LayoutError::TooFewChannels(per_anchor));
    }

    let num_classes = per_anchor - BOX_CHANNELS;
    if num_classes != num_labels {
      return Err(LayoutError::ClassCount {
        classes: num_classes,
        labels: num_labels,
      });
    }

    Ok(Self {
      num_anchors,
      num_classes,
      grid_height,
      grid_width,
    })
  }

  /// 每个锚框占用的通道数
  pub fn anchor_channels(&self) -> usize {
    BOX_CHANNELS + self.num_classes
  }

  /// 解码循环的总迭代次数，决定单帧后处理的开销上限
  pub fn cells(&self) -> usize {
    self.grid_height * self.grid_width * self.num_anchors
  }
}

/// 解码得到的候选框，概率向量在抑制阶段会被原地清零
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
  pub bounding_box: BoundingBox,
  pub probabilities: Box<[f32]>,
}

impl Candidate {
  pub fn new(bounding_box: BoundingBox, probabilities: Vec<f32>) -> Self {
    Self {
      bounding_box,
      probabilities: probabilities.into_boxed_slice(),
    }
  }

  /// 当前最大概率及其类别索引，并列时取最小的类别索引
  pub fn best_class(&self) -> (usize, f32) {
    let mut best = (0usize, f32::NEG_INFINITY);
    for (class_id, &p) in self.probabilities.iter().enumerate() {
      if p > best.1 {
        best = (class_id, p);
      }
    }
    best
  }

  pub fn max_probability(&self) -> f32 {
    self.best_class().1
  }
}

/// 把检测网络的原始输出解码为候选框
///
/// 张量形状与锚框表、标签数量不匹配属于接线错误，直接 panic。
/// 需要可恢复错误时先调用 [`GridLayout::new`] 检查。
pub fn decode(
  tensor: &OutputTensor,
  anchors: &AnchorTable,
  config: &DetectorConfig,
) -> Vec<Candidate> {
  let layout = match GridLayout::new(tensor, anchors, config.num_classes()) {
    Ok(layout) => layout,
    Err(e) => {
      error!("模型输出与检测器配置不匹配: {}", e);
      panic!("模型输出与检测器配置不匹配: {e}");
    }
  };
  decode_with_layout(tensor, anchors, config, &layout)
}

/// 按已检查过的布局解码
///
/// 遍历顺序固定为 y 外层、x 内层、锚框按表序，决定后续抑制阶段的并列次序。
pub(crate) fn decode_with_layout(
  tensor: &OutputTensor,
  anchors: &AnchorTable,
  config: &DetectorConfig,
  layout: &GridLayout,
) -> Vec<Candidate> {
  let outputs = tensor.as_slice();
  let (grid_h, grid_w) = (layout.grid_height, layout.grid_width);
  let (height, width) = (grid_h as f32, grid_w as f32);
  let stride = grid_h * grid_w;
  let threshold = config.probability_threshold();

  debug!(
    "解码网格 {}x{}, 锚框 {}, 类别 {}",
    grid_h, grid_w, layout.num_anchors, layout.num_classes
  );

  let mut candidates = Vec::new();
  for grid_y in 0..grid_h {
    for grid_x in 0..grid_w {
      let base = grid_x + grid_y * grid_w;
      for (anchor_idx, &(anchor_w, anchor_h)) in anchors.iter().enumerate() {
        let offset = anchor_idx * layout.anchor_channels();
        let value = |k: usize| outputs[base + (offset + k) * stride];

        let center_x = (logistic(value(0)) + grid_x as f32) / width;
        let center_y = (logistic(value(1)) + grid_y as f32) / height;
        let box_w = value(2).exp() * anchor_w / width;
        let box_h = value(3).exp() * anchor_h / height;
        let objectness = logistic(value(4));

        let mut probabilities: Vec<f32> = (0..layout.num_classes)
          .map(|c| value(BOX_CHANNELS + c))
          .collect();
        scaled_softmax(&mut probabilities, objectness);

        let max = probabilities
          .iter()
          .copied()
          .fold(f32::NEG_INFINITY, f32::max);
        if max > threshold {
          candidates.push(Candidate::new(
            BoundingBox::new(
              center_x - box_w / 2.0,
              center_y - box_h / 2.0,
              box_w,
              box_h,
            ),
            probabilities,
          ));
        }
      }
    }
  }

  debug!(
    "解码完成: {} 个位置中保留 {} 个候选框",
    layout.cells(),
    candidates.len()
  );
  candidates
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Labels;

  const DEEP_NEGATIVE: f32 = -30.0;

  fn config(classes: usize) -> DetectorConfig {
    DetectorConfig::builder(Labels::new((0..classes).map(|c| format!("class-{c}"))))
      .build()
      .unwrap()
  }

  #[test]
  fn layout_from_shape() {
    let tensor = OutputTensor::filled([1, 5 * 7, 13, 13], 0.0).unwrap();
    let layout = GridLayout::new(&tensor, &AnchorTable::custom_vision(), 2).unwrap();
    assert_eq!(layout.num_anchors, 5);
    assert_eq!(layout.num_classes, 2);
    assert_eq!(layout.anchor_channels(), 7);
    assert_eq!(layout.cells(), 13 * 13 * 5);
  }

  #[test]
  fn layout_errors() {
    let anchors = AnchorTable::custom_vision();
    let batch2 = OutputTensor::filled([2, 30, 2, 2], 0.0).unwrap();
    assert_eq!(
      GridLayout::new(&batch2, &anchors, 1),
      Err(LayoutError::Batch(2))
    );

    let odd = OutputTensor::filled([1, 31, 2, 2], 0.0).unwrap();
    assert_eq!(
      GridLayout::new(&odd, &anchors, 1),
      Err(LayoutError::ChannelsNotDivisible {
        channels: 31,
        anchors: 5
      })
    );

    let few = OutputTensor::filled([1, 20, 2, 2], 0.0).unwrap();
    assert_eq!(
      GridLayout::new(&few, &anchors, 1),
      Err(LayoutError::TooFewChannels(4))
    );

    let labels = OutputTensor::filled([1, 35, 2, 2], 0.0).unwrap();
    assert_eq!(
      GridLayout::new(&labels, &anchors, 1),
      Err(LayoutError::ClassCount {
        classes: 2,
        labels: 1
      })
    );
  }

  #[test]
  #[should_panic(expected = "模型输出与检测器配置不匹配")]
  fn decode_panics_on_label_mismatch() {
    let tensor = OutputTensor::filled([1, 35, 13, 13], 0.0).unwrap();
    decode(&tensor, &AnchorTable::custom_vision(), &config(1));
  }

  #[test]
  fn deeply_negative_tensor_has_no_candidates() {
    let tensor = OutputTensor::filled([1, 30, 13, 13], DEEP_NEGATIVE).unwrap();
    let candidates = decode(&tensor, &AnchorTable::custom_vision(), &config(1));
    assert!(candidates.is_empty());
  }

  #[test]
  fn decodes_box_geometry() {
    let anchors = AnchorTable::from_flat(&[2.0, 3.0]).unwrap();
    let mut tensor = OutputTensor::filled([1, 7, 4, 5], DEEP_NEGATIVE).unwrap();
    // 第 (x=3, y=1) 个网格
    tensor.set(0, 1, 3, 0.0);
    tensor.set(1, 1, 3, 0.0);
    tensor.set(2, 1, 3, 0.0);
    tensor.set(3, 1, 3, 1.0f32.ln());
    tensor.set(4, 1, 3, 20.0);
    tensor.set(5, 1, 3, 4.0);
    tensor.set(6, 1, 3, 0.0);

    let candidates = decode(&tensor, &anchors, &config(2));
    assert_eq!(candidates.len(), 1);

    let candidate = &candidates[0];
    let bbox = candidate.bounding_box;
    assert!((bbox.width - 2.0 / 5.0).abs() < 1e-6);
    assert!((bbox.height - 3.0 / 4.0).abs() < 1e-6);
    let (cx, cy) = bbox.center();
    assert!((cx - 3.5 / 5.0).abs() < 1e-6);
    assert!((cy - 1.5 / 4.0).abs() < 1e-6);

    let sum: f32 = candidate.probabilities.iter().sum();
    assert!((sum - logistic(20.0)).abs() < 1e-5);
    assert_eq!(candidate.best_class().0, 0);
  }

  #[test]
  fn scaled_probabilities_sum_to_objectness() {
    let anchors = AnchorTable::from_flat(&[1.0, 1.0]).unwrap();
    let mut tensor = OutputTensor::filled([1, 8, 1, 1], 0.0).unwrap();
    tensor.set(4, 0, 0, 0.3);
    tensor.set(5, 0, 0, 2.0);
    tensor.set(6, 0, 0, -1.0);
    tensor.set(7, 0, 0, 0.5);

    let candidates = decode(&tensor, &anchors, &config(3));
    assert_eq!(candidates.len(), 1);
    let sum: f32 = candidates[0].probabilities.iter().sum();
    assert!((sum - logistic(0.3)).abs() < 1e-6);
  }

  #[test]
  fn iterates_rows_then_columns_then_anchors() {
    let anchors = AnchorTable::from_flat(&[1.0, 1.0, 2.0, 2.0]).unwrap();
    let mut tensor = OutputTensor::filled([1, 12, 2, 2], DEEP_NEGATIVE).unwrap();
    // 逐个点亮 (y=1,x=0,a=1)、(y=0,x=1,a=0)、(y=0,x=1,a=1)
    for (y, x, anchor) in [(1usize, 0usize, 1usize), (0, 1, 0), (0, 1, 1)] {
      let offset = anchor * 6;
      tensor.set(offset + 2, y, x, 0.0);
      tensor.set(offset + 3, y, x, 0.0);
      tensor.set(offset + 4, y, x, 10.0);
      tensor.set(offset + 5, y, x, 0.0);
    }

    let candidates = decode(&tensor, &anchors, &config(1));
    assert_eq!(candidates.len(), 3);
    let widths: Vec<f32> = candidates.iter().map(|c| c.bounding_box.width).collect();
    let rows: Vec<f32> = candidates.iter().map(|c| c.bounding_box.center().1).collect();
    assert_eq!(widths, [0.5, 1.0, 1.0]);
    assert!(rows[0] < 0.25 && rows[1] < 0.25 && rows[2] > 0.25);
  }

  #[test]
  fn best_class_prefers_lowest_index_on_tie() {
    let candidate = Candidate::new(BoundingBox::default(), vec![0.2, 0.4, 0.4]);
    assert_eq!(candidate.best_class(), (1, 0.4));
  }
}
