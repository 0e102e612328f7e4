// 该文件是 rknn-yolo-post 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use rknn_yolo_post::{
  FromUrl,
  config::{DecodeConfig, LabelTable},
  input::InputWrapper,
  model::{Yolov5, Yolov5Builder},
  output::OutputWrapper,
  quant::Activation,
  runtime::ReplayRuntime,
  task::{OneShotTask, RepeatShotTask, Task},
};

const MODEL_WIDTH: u32 = 640;
const MODEL_HEIGHT: u32 = 640;

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("模型路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!(
    "置信度阈值: {}, NMS 阈值: {}, 最大检测数: {}",
    args.confidence, args.nms_threshold, args.max_detections
  );

  let labels = match &args.labels {
    Some(path) => LabelTable::from_file(path)?,
    None => LabelTable::coco(),
  };
  info!("标签数量: {}", labels.len());

  let activation = if args.activated_outputs {
    Activation::Identity
  } else {
    Activation::Sigmoid
  };
  let config = DecodeConfig::builder()
    .conf_threshold(args.confidence)
    .nms_threshold(args.nms_threshold)
    .max_detections(args.max_detections)
    .box_coding(args.box_coding.into())
    .activation(activation)
    .labels(labels.clone());

  let input = InputWrapper::<MODEL_WIDTH, MODEL_HEIGHT>::from_url(&args.input)?;
  let model: Yolov5<ReplayRuntime, MODEL_WIDTH, MODEL_HEIGHT> =
    Yolov5Builder::from_url(&args.model)?
      .config(config)
      .build()?;
  let output = OutputWrapper::from_url(&args.output)?.with_labels(labels);

  if args.loop_count > 1 {
    RepeatShotTask::default()
      .with_times(args.loop_count)
      .run_task(input.into_nhwc(), model, output)?;
  } else {
    OneShotTask.run_task(input.into_nhwc(), model, output)?;
  }

  Ok(())
}
