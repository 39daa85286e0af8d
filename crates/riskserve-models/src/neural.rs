//! Neural-network predictors restored from checkpoints with Candle
//!
//! The architecture is recovered from tensor names and shapes, following
//! PyTorch module naming:
//! - `lstm.weight_ih_l{k}` … plus `head.weight`/`head.bias`: stacked LSTM
//!   sequence regressor, head applied to the last hidden state of each window
//! - `layers.{i}.weight`/`layers.{i}.bias`: MLP with ReLU between layers

use crate::features::Features;
use crate::predictor::{argmax, expect_tabular, softmax, Predictor, PredictorTask};
use candle_core::{DType, Device, Tensor};
use candle_nn::rnn::{lstm, LSTMConfig, LSTM, RNN};
use candle_nn::{linear, Linear, Module, VarBuilder};
use riskserve_core::{Error, Result};
use std::collections::HashMap;
use std::path::Path;

/// Metadata key holding the JSON `CheckpointConfig` in a safetensors header
pub const CONFIG_METADATA_KEY: &str = "config";

/// Raw checkpoint contents before the architecture is built
pub struct Checkpoint {
    pub tensors: HashMap<String, Tensor>,
    /// JSON configuration embedded in the file, if any
    pub config_json: Option<String>,
}

impl Checkpoint {
    /// Read a safetensors file, including its `__metadata__` header
    pub fn read_safetensors(path: &Path, device: &Device) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| Error::load(format!("Failed to read {}: {}", path.display(), e)))?;

        let (_, metadata) = safetensors::SafeTensors::read_metadata(&bytes)
            .map_err(|e| Error::load(format!("Failed to parse safetensors header: {}", e)))?;
        let config_json = metadata
            .metadata()
            .as_ref()
            .and_then(|m| m.get(CONFIG_METADATA_KEY))
            .cloned();

        let tensors = candle_core::safetensors::load_buffer(&bytes, device)
            .map_err(|e| Error::load(format!("Failed to load SafeTensors: {}", e)))?;

        Ok(Self {
            tensors,
            config_json,
        })
    }

    /// Read a PyTorch state dict (`torch.save(model.state_dict(), ...)`)
    pub fn read_torch(path: &Path, device: &Device) -> Result<Self> {
        let entries = candle_core::pickle::read_all(path)
            .map_err(|e| Error::load(format!("Failed to load PyTorch weights: {}", e)))?;

        let mut tensors = HashMap::with_capacity(entries.len());
        for (name, tensor) in entries {
            let tensor = tensor
                .to_device(device)
                .map_err(|e| Error::load(format!("Failed to move tensor {}: {}", name, e)))?;
            tensors.insert(name, tensor);
        }

        Ok(Self {
            tensors,
            config_json: None,
        })
    }
}

enum Network {
    Mlp(Vec<Linear>),
    Lstm { layers: Vec<LSTM>, head: Linear },
}

/// A restored network ready for CPU inference
pub struct NeuralNetwork {
    network: Network,
    device: Device,
    input_width: usize,
    outputs: usize,
}

fn dims(tensors: &HashMap<String, Tensor>, name: &str) -> Option<Vec<usize>> {
    tensors.get(name).map(|t| t.dims().to_vec())
}

fn matrix_dims(tensors: &HashMap<String, Tensor>, name: &str) -> Result<(usize, usize)> {
    match dims(tensors, name).as_deref() {
        Some([rows, cols]) => Ok((*rows, *cols)),
        Some(other) => Err(Error::load(format!(
            "tensor {} has shape {:?}, expected a matrix",
            name, other
        ))),
        None => Err(Error::load(format!("checkpoint is missing tensor {}", name))),
    }
}

impl NeuralNetwork {
    /// Build the network whose layout matches the checkpoint tensors
    pub fn from_tensors(tensors: HashMap<String, Tensor>, device: &Device) -> Result<Self> {
        if tensors.contains_key("lstm.weight_ih_l0") {
            Self::build_lstm(tensors, device)
        } else if tensors.contains_key("layers.0.weight") {
            Self::build_mlp(tensors, device)
        } else {
            let mut names: Vec<&String> = tensors.keys().collect();
            names.sort();
            Err(Error::load(format!(
                "unrecognised checkpoint layout (tensors: {:?})",
                names
            )))
        }
    }

    fn build_lstm(tensors: HashMap<String, Tensor>, device: &Device) -> Result<Self> {
        let (gates, input_width) = matrix_dims(&tensors, "lstm.weight_ih_l0")?;
        if gates % 4 != 0 {
            return Err(Error::load(format!(
                "lstm.weight_ih_l0 has {} rows, not a multiple of 4",
                gates
            )));
        }
        let hidden = gates / 4;
        let depth = (0..)
            .take_while(|k| tensors.contains_key(&format!("lstm.weight_ih_l{}", k)))
            .count();
        let (outputs, head_in) = matrix_dims(&tensors, "head.weight")?;
        if head_in != hidden || outputs != 1 {
            return Err(Error::load(format!(
                "head.weight has shape [{}, {}], expected [1, {}]",
                outputs, head_in, hidden
            )));
        }

        let vb = VarBuilder::from_tensors(tensors, DType::F32, device);
        let mut layers = Vec::with_capacity(depth);
        for k in 0..depth {
            let in_dim = if k == 0 { input_width } else { hidden };
            let config = LSTMConfig {
                layer_idx: k,
                ..Default::default()
            };
            let layer = lstm(in_dim, hidden, config, vb.pp("lstm"))
                .map_err(|e| Error::load(format!("Failed to load LSTM layer {}: {}", k, e)))?;
            layers.push(layer);
        }
        let head = linear(hidden, outputs, vb.pp("head"))
            .map_err(|e| Error::load(format!("Failed to load LSTM head: {}", e)))?;

        tracing::debug!(
            "Restored {}-layer LSTM (input {}, hidden {})",
            depth,
            input_width,
            hidden
        );

        Ok(Self {
            network: Network::Lstm { layers, head },
            device: device.clone(),
            input_width,
            outputs,
        })
    }

    fn build_mlp(tensors: HashMap<String, Tensor>, device: &Device) -> Result<Self> {
        let depth = (0..)
            .take_while(|i| tensors.contains_key(&format!("layers.{}.weight", i)))
            .count();
        let shapes = (0..depth)
            .map(|i| matrix_dims(&tensors, &format!("layers.{}.weight", i)))
            .collect::<Result<Vec<_>>>()?;

        for (i, pair) in shapes.windows(2).enumerate() {
            let (out_prev, _) = pair[0];
            let (_, in_next) = pair[1];
            if out_prev != in_next {
                return Err(Error::load(format!(
                    "layer {} outputs {} features but layer {} expects {}",
                    i,
                    out_prev,
                    i + 1,
                    in_next
                )));
            }
        }

        let input_width = shapes[0].1;
        let outputs = shapes[shapes.len() - 1].0;

        let vb = VarBuilder::from_tensors(tensors, DType::F32, device);
        let mut layers = Vec::with_capacity(shapes.len());
        for (i, (out_dim, in_dim)) in shapes.iter().enumerate() {
            let layer = linear(*in_dim, *out_dim, vb.pp(format!("layers.{}", i)))
                .map_err(|e| Error::load(format!("Failed to load layer {}: {}", i, e)))?;
            layers.push(layer);
        }

        Ok(Self {
            network: Network::Mlp(layers),
            device: device.clone(),
            input_width,
            outputs,
        })
    }

    /// True for sequence (LSTM) networks
    pub fn is_sequence_model(&self) -> bool {
        matches!(self.network, Network::Lstm { .. })
    }

    /// Number of output units
    pub fn outputs(&self) -> usize {
        self.outputs
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if width != self.input_width {
            return Err(Error::inference(format!(
                "network expects {} features, got {}",
                self.input_width, width
            )));
        }
        Ok(())
    }

    /// Raw network outputs, one row per item
    fn forward(&self, features: &Features) -> Result<Vec<Vec<f32>>> {
        let err = |e: candle_core::Error| Error::inference(format!("forward pass failed: {}", e));
        self.check_width(features.feature_count())?;

        let output = match &self.network {
            Network::Mlp(layers) => {
                let x = expect_tabular(features, "mlp")?;
                let data: Vec<f32> = x.as_slice().iter().map(|v| *v as f32).collect();
                let mut h = Tensor::from_vec(data, (x.rows(), x.cols()), &self.device).map_err(err)?;
                for (i, layer) in layers.iter().enumerate() {
                    h = layer.forward(&h).map_err(err)?;
                    if i + 1 < layers.len() {
                        h = h.relu().map_err(err)?;
                    }
                }
                h
            }
            Network::Lstm { layers, head } => {
                let Features::Sequences(windows) = features else {
                    return Err(Error::inference("lstm expects sequence windows, got tabular input"));
                };
                let mut data = Vec::with_capacity(windows.len() * windows.window_size() * windows.feature_count());
                for window in windows {
                    data.extend(window.iter().map(|v| *v as f32));
                }
                let mut x = Tensor::from_vec(
                    data,
                    (windows.len(), windows.window_size(), windows.feature_count()),
                    &self.device,
                )
                .map_err(err)?;

                let mut last = None;
                for layer in layers {
                    let states = layer.seq(&x).map_err(err)?;
                    x = layer.states_to_tensor(&states).map_err(err)?;
                    last = states.last().map(|s| s.h().clone());
                }
                let last = last.ok_or_else(|| Error::inference("lstm produced no states"))?;
                head.forward(&last).map_err(err)?
            }
        };

        output.to_vec2::<f32>().map_err(err)
    }
}

impl Predictor for NeuralNetwork {
    fn predict(&self, features: &Features) -> Result<Vec<f64>> {
        let output = self.forward(features)?;
        Ok(match self.task() {
            PredictorTask::Regression => output.iter().map(|row| row[0] as f64).collect(),
            PredictorTask::Classification => output
                .iter()
                .map(|row| {
                    let logits: Vec<f64> = row.iter().map(|v| *v as f64).collect();
                    argmax(&logits) as f64
                })
                .collect(),
        })
    }

    fn predict_proba(&self, features: &Features) -> Result<Vec<Vec<f64>>> {
        let output = self.forward(features)?;
        Ok(output
            .iter()
            .map(|row| softmax(&row.iter().map(|v| *v as f64).collect::<Vec<_>>()))
            .collect())
    }

    fn supports_proba(&self) -> bool {
        self.task() == PredictorTask::Classification
    }

    fn task(&self) -> PredictorTask {
        if self.outputs > 1 {
            PredictorTask::Classification
        } else {
            PredictorTask::Regression
        }
    }

    fn kind(&self) -> &str {
        match self.network {
            Network::Mlp(_) => "mlp",
            Network::Lstm { .. } => "lstm",
        }
    }

    fn input_width(&self) -> Option<usize> {
        Some(self.input_width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskserve_core::Matrix;

    fn tensor(data: Vec<f32>, shape: (usize, usize)) -> Tensor {
        Tensor::from_vec(data, shape, &Device::Cpu).unwrap()
    }

    #[test]
    fn test_mlp_classifier_from_tensors() {
        // 2 inputs -> 3 logits; class = argmax of [x0, x1, 0]
        let mut tensors = HashMap::new();
        tensors.insert(
            "layers.0.weight".to_string(),
            tensor(vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0], (3, 2)),
        );
        tensors.insert(
            "layers.0.bias".to_string(),
            Tensor::zeros(3, DType::F32, &Device::Cpu).unwrap(),
        );

        let net = NeuralNetwork::from_tensors(tensors, &Device::Cpu).unwrap();
        assert_eq!(net.task(), PredictorTask::Classification);
        assert!(net.supports_proba());

        let x = Features::Tabular(
            Matrix::from_rows(vec![vec![5.0, 1.0], vec![1.0, 5.0], vec![-1.0, -1.0]]).unwrap(),
        );
        assert_eq!(net.predict(&x).unwrap(), vec![0.0, 1.0, 2.0]);
        let proba = net.predict_proba(&x).unwrap();
        assert_eq!(proba.len(), 3);
        assert!((proba[0].iter().sum::<f64>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_layout_is_load_error() {
        let mut tensors = HashMap::new();
        tensors.insert("encoder.weight".to_string(), tensor(vec![1.0], (1, 1)));
        let err = NeuralNetwork::from_tensors(tensors, &Device::Cpu).err().unwrap();
        assert!(matches!(err, Error::Load(_)));
    }

    #[test]
    fn test_mlp_shape_mismatch_is_load_error() {
        let mut tensors = HashMap::new();
        tensors.insert("layers.0.weight".to_string(), tensor(vec![0.0; 6], (3, 2)));
        tensors.insert("layers.0.bias".to_string(), Tensor::zeros(3, DType::F32, &Device::Cpu).unwrap());
        tensors.insert("layers.1.weight".to_string(), tensor(vec![0.0; 4], (1, 4)));
        tensors.insert("layers.1.bias".to_string(), Tensor::zeros(1, DType::F32, &Device::Cpu).unwrap());
        let err = NeuralNetwork::from_tensors(tensors, &Device::Cpu).err().unwrap();
        assert!(matches!(err, Error::Load(_)));
    }
}
