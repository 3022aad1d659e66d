// 该文件是 Shibie （识别） 项目的一部分。
// src/bin/simple_continueshot.rs - 连续张量后处理
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

use anyhow::Result;
use clap::Parser;

use shibie::{
  FromUrl,
  args::CommonArgs,
  input::InputWrapper,
  output::OutputWrapper,
  task::{ContinuousTask, Task},
};
use tracing::info;

/// Shibie 连续后处理
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub common: CommonArgs,

  /// 最多处理的帧数，不指定时处理全部输入
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  args.common.log();

  let input = InputWrapper::from_url(&args.common.input)?;
  let model = args.common.build_detector()?;
  let output = OutputWrapper::from_url(&args.common.output)?;

  let report = ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .run_task(input, model, output)?;
  if let Some(average) = report.average(0) {
    info!("平均后处理时间: {:.2?}", average);
  }

  Ok(())
}
