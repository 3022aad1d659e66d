// 该文件是 Shibie （识别） 项目的一部分。
// src/model/suppress.rs - 按类别的非极大值抑制
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

use tracing::debug;

use crate::model::{Candidate, DetectorConfig, Prediction, math::iou};

/// 第一个取得最大值的下标；全部为 NaN 或空时返回 None
fn first_max(values: &[f32]) -> Option<(usize, f32)> {
  let mut best: Option<(usize, f32)> = None;
  for (i, &v) in values.iter().enumerate() {
    if best.is_none_or(|(_, max)| v > max) && !v.is_nan() {
      best = Some((i, v));
    }
  }
  best
}

/// 贪心的按类别非极大值抑制
///
/// 每轮取全局概率最大的候选框输出，再把与它 IoU 超过阈值的候选框
/// 在该类别上的概率清零（其它类别不受影响，之后仍可能胜出）。
/// 输出按概率降序，数量不超过 `max_detections`；并列时先解码出的候选框优先。
///
/// `candidates` 作为本次调用独占的工作缓冲区，会被原地修改。
pub fn suppress(mut candidates: Vec<Candidate>, config: &DetectorConfig) -> Vec<Prediction> {
  let mut predictions = Vec::new();
  if candidates.is_empty() {
    return predictions;
  }

  let threshold = config.probability_threshold();
  let iou_threshold = config.iou_threshold();

  // 每个候选框当前的最大概率，只在其概率被清零时刷新
  let mut max_probs: Vec<f32> = candidates.iter().map(Candidate::max_probability).collect();

  while predictions.len() < config.max_detections() {
    let Some((index, max)) = first_max(&max_probs) else {
      break;
    };
    if max < threshold {
      break;
    }

    let (class_id, _) = candidates[index].best_class();
    let winner = candidates[index].bounding_box;
    let class_name = config.labels().name(class_id).unwrap_or("unknown");

    debug!(
      "输出 #{}: {} {:.4} ({:.3}, {:.3}, {:.3}x{:.3})",
      predictions.len(),
      class_name,
      max,
      winner.left,
      winner.top,
      winner.width,
      winner.height
    );
    predictions.push(Prediction {
      probability: max,
      class_name: class_name.to_string(),
      class_id,
      bounding_box: winner,
    });

    for (i, candidate) in candidates.iter_mut().enumerate() {
      // 胜出者自身总是清零，退化框的 IoU 为 0 也不会被重复输出
      if i == index || iou(&winner, &candidate.bounding_box) > iou_threshold {
        if let Some(p) = candidate.probabilities.get_mut(class_id) {
          *p = 0.0;
        }
        max_probs[i] = candidate.max_probability();
      }
    }
  }

  debug!(
    "非极大值抑制: {} 个候选框, 输出 {} 个结果",
    candidates.len(),
    predictions.len()
  );
  predictions
}
