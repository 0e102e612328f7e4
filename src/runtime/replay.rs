// 该文件是 rknn-yolo-post 项目的一部分。
// src/runtime/replay.rs - 回放已导出的输出张量
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
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  quant::QuantParam,
  runtime::{InputShape, Runtime},
  tensor::{OutputTensor, TensorShape},
};

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
  #[error("I/O 错误: {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("清单文件解析错误: {0}")]
  Manifest(#[from] serde_json::Error),
  #[error("输入大小不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  InputSize { expected: usize, actual: usize },
}

#[derive(Debug, Deserialize)]
struct Manifest {
  input: InputShape,
  outputs: Vec<ManifestOutput>,
}

#[derive(Debug, Deserialize)]
struct ManifestOutput {
  file: PathBuf,
  #[serde(flatten)]
  shape: TensorShape,
  zero_point: i32,
  scale: f32,
}

/// 从目录回放推理输出，目录内为 `manifest.json` 与各输出的原始字节文件。
///
/// 不依赖 NPU，用于在开发机上复现板端推理结果。
#[derive(Debug, Clone)]
pub struct ReplayRuntime {
  input: InputShape,
  outputs: Vec<OutputTensor>,
}

impl FromUrlWithScheme for ReplayRuntime {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayRuntime {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }
    Self::open(url.path())
  }
}

fn read(path: &Path) -> Result<Vec<u8>, ReplayError> {
  std::fs::read(path).map_err(|source| ReplayError::Io {
    path: path.to_path_buf(),
    source,
  })
}

impl ReplayRuntime {
  pub fn new(input: InputShape, outputs: Vec<OutputTensor>) -> Self {
    Self { input, outputs }
  }

  pub fn open(directory: impl AsRef<Path>) -> Result<Self, ReplayError> {
    let directory = directory.as_ref();
    info!("加载回放目录: {}", directory.display());

    let manifest: Manifest = serde_json::from_slice(&read(&directory.join(MANIFEST_FILE))?)?;
    debug!(
      "模型输入: {}x{}x{}, 输出数量: {}",
      manifest.input.width,
      manifest.input.height,
      manifest.input.channels,
      manifest.outputs.len()
    );

    let mut outputs = Vec::with_capacity(manifest.outputs.len());
    for (index, entry) in manifest.outputs.into_iter().enumerate() {
      let data = read(&directory.join(&entry.file))?;
      let quant = QuantParam::new(entry.scale, entry.zero_point);
      debug!(
        "  index={}, file={}, dims={}, n_elems={}, zp={}, scale={}",
        index,
        entry.file.display(),
        entry.shape,
        data.len(),
        quant.zero_point,
        quant.scale
      );
      match entry.shape.num_elements() {
        Some(n) if n == data.len() => {}
        Some(_) => warn!(
          "输出 {} 的字节数 {} 与形状 {} 不一致",
          index,
          data.len(),
          entry.shape
        ),
        None => warn!("输出 {} 的形状 {} 元素数溢出", index, entry.shape),
      }
      outputs.push(OutputTensor::new(data, entry.shape, quant));
    }

    Ok(Self {
      input: manifest.input,
      outputs,
    })
  }
}

impl Runtime for ReplayRuntime {
  type Error = ReplayError;

  fn input_shape(&self) -> InputShape {
    self.input
  }

  fn num_outputs(&self) -> usize {
    self.outputs.len()
  }

  fn run(&self, input: &[u8]) -> Result<Vec<OutputTensor>, Self::Error> {
    let expected = self.input.num_bytes();
    if input.len() != expected {
      return Err(ReplayError::InputSize {
        expected,
        actual: input.len(),
      });
    }
    Ok(self.outputs.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
      "rknn-yolo-post-replay-{}-{}",
      name,
      std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
  }

  #[test]
  fn opens_manifest_and_outputs() {
    let dir = scratch_dir("open");
    std::fs::write(dir.join("out0.bin"), [1u8, 2, 3, 4, 5, 6]).unwrap();
    std::fs::write(
      dir.join(MANIFEST_FILE),
      r#"{
        "input": {"width": 2, "height": 2, "channels": 3},
        "outputs": [
          {"file": "out0.bin", "grid_h": 1, "grid_w": 1, "anchors": 1, "channels": 6,
           "zero_point": -128, "scale": 0.5}
        ]
      }"#,
    )
    .unwrap();

    let url = Url::from_directory_path(&dir).unwrap();
    let url = Url::parse(&url.as_str().replacen("file", "replay", 1)).unwrap();
    let runtime = ReplayRuntime::from_url(&url).unwrap();
    assert_eq!(runtime.num_outputs(), 1);
    assert_eq!(runtime.input_shape().num_bytes(), 12);

    let outputs = runtime.run(&[0u8; 12]).unwrap();
    assert_eq!(outputs[0].shape(), TensorShape::new(1, 1, 1, 6));
    assert_eq!(outputs[0].quant(), QuantParam::new(0.5, -128));
    assert_eq!(outputs[0].view().data(), &[1, 2, 3, 4, 5, 6]);

    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn overflowing_shape_does_not_panic() {
    let dir = scratch_dir("overflow");
    std::fs::write(dir.join("out0.bin"), [0u8; 6]).unwrap();
    std::fs::write(
      dir.join(MANIFEST_FILE),
      r#"{
        "input": {"width": 2, "height": 2, "channels": 3},
        "outputs": [
          {"file": "out0.bin", "grid_h": 9223372036854775809, "grid_w": 9223372036854775809,
           "anchors": 1, "channels": 6, "zero_point": 0, "scale": 0.5}
        ]
      }"#,
    )
    .unwrap();

    let runtime = ReplayRuntime::open(&dir).unwrap();
    let outputs = runtime.run(&[0u8; 12]).unwrap();
    assert_eq!(outputs[0].shape().num_elements(), None);
    assert_eq!(outputs[0].view().len(), 6);

    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn rejects_wrong_input_size() {
    let runtime = ReplayRuntime::new(
      InputShape {
        width: 2,
        height: 2,
        channels: 3,
      },
      Vec::new(),
    );
    let err = runtime.run(&[0u8; 11]).unwrap_err();
    assert!(matches!(
      err,
      ReplayError::InputSize {
        expected: 12,
        actual: 11
      }
    ));
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("file:///tmp/model").unwrap();
    assert!(matches!(
      ReplayRuntime::from_url(&url),
      Err(ReplayError::SchemeMismatch { .. })
    ));
  }

  #[test]
  fn missing_manifest_is_io_error() {
    let dir = scratch_dir("missing");
    assert!(matches!(
      ReplayRuntime::open(&dir),
      Err(ReplayError::Io { .. })
    ));
    std::fs::remove_dir_all(&dir).unwrap();
  }
}
