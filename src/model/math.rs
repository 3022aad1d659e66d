// 该文件是 Shibie （识别） 项目的一部分。
// src/model/math.rs - 后处理数学函数
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

use crate::model::BoundingBox;

/// 分支稳定的 logistic 函数
///
/// 正数走 `1/(1+e^-x)`，非正数走 `e^x/(1+e^x)`，两端都不会溢出。
/// 对任意有限输入结果都是有限值，不会出现 NaN 或无穷大。
/// 结果以 `f32` 返回，因此会饱和：约 `x > 17` 时恰好为 1.0，约 `x < -104` 时恰好为 0.0。
pub fn logistic(x: f32) -> f32 {
  let x = x as f64;
  let y = if x > 0.0 {
    1.0 / (1.0 + (-x).exp())
  } else {
    let e = x.exp();
    e / (1.0 + e)
  };
  y as f32
}

/// 数值稳定的 softmax，结果整体乘以 `scale`
///
/// 原地把类别 logits 换成概率，概率之和等于 `scale`。
pub fn scaled_softmax(logits: &mut [f32], scale: f32) {
  let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
  let mut sum = 0.0f32;
  for v in logits.iter_mut() {
    *v = (*v - max).exp();
    sum += *v;
  }
  let factor = scale / sum;
  for v in logits.iter_mut() {
    *v *= factor;
  }
}

/// 计算两个边界框的 IoU
///
/// 并集面积不为正（退化的零面积框）时返回 0.0，不做除法。
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
  let x1 = a.left.max(b.left);
  let y1 = a.top.max(b.top);
  let x2 = a.right().min(b.right());
  let y2 = a.bottom().min(b.bottom());

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = a.area() + b.area() - intersection;

  if union > 0.0 && union.is_finite() {
    intersection / union
  } else {
    0.0
  }
}
