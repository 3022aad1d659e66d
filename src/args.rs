// 该文件是 Shibie （识别） 项目的一部分。
// src/args.rs - 命令行参数
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

use clap::Args;
use tracing::info;
use url::Url;

use crate::{
  FromUrl,
  model::{CustomVision, CustomVisionBuilder, CustomVisionError},
};

/// 各个可执行程序共用的参数
#[derive(Args, Debug)]
pub struct CommonArgs {
  /// 检测器配置，指向标签文件
  /// 例如: customvision:///path/labels.txt?probability=0.1&iou=0.45
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入来源
  /// - 单个张量: tensor:///path/out.bin?shape=1,30,13,13 或 tensor:///path/out.json
  /// - 张量目录: tensors:///path/dir?shape=1,30,13,13
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出路径
  /// - 日志: log://?min_probability=0.7
  /// - JSON 文件: json:///path/result.json
  /// - 目录记录: folder:///path/dir?always
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,

  /// 最大结果数量，覆盖 MODEL 中的设置
  #[arg(long, value_name = "COUNT")]
  pub max_detections: Option<usize>,

  /// 概率阈值 (0.0 - 1.0)，覆盖 MODEL 中的设置
  #[arg(long, value_name = "THRESHOLD")]
  pub probability: Option<f32>,

  /// NMS IoU 阈值 (0.0 - 1.0)，覆盖 MODEL 中的设置
  #[arg(long, value_name = "THRESHOLD")]
  pub iou: Option<f32>,
}

impl CommonArgs {
  pub fn log(&self) {
    info!("检测器配置: {}", self.model);
    info!("输入来源: {}", self.input);
    info!("输出路径: {}", self.output);
  }

  pub fn build_detector(&self) -> Result<CustomVision, CustomVisionError> {
    let mut builder = CustomVisionBuilder::from_url(&self.model)?;
    if let Some(max_detections) = self.max_detections {
      builder = builder.max_detections(max_detections);
    }
    if let Some(probability) = self.probability {
      builder = builder.probability_threshold(probability);
    }
    if let Some(iou) = self.iou {
      builder = builder.iou_threshold(iou);
    }
    builder.build()
  }
}
