//! ONNX-based sentence embedding engine.
//!
//! Loads a sentence-transformers ONNX export and its tokenizer, binds the
//! session to CUDA or the CPU, and produces pooled, L2-normalized float32
//! embeddings. Requires the `onnx` feature.

#[cfg(feature = "onnx")]
mod inner {
    use std::path::Path;

    use embedserve_core::device::accelerator_present;
    use embedserve_core::{ComputeDevice, DevicePreference, Error, Result};
    use ndarray::{Array2, ArrayView2, ArrayView3};
    use ort::execution_providers::{
        CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider,
    };
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::Tensor;
    use parking_lot::Mutex;
    use tokenizers::Tokenizer;
    use tracing::{debug, info, warn};

    use crate::embedder::{encode_in_batches, EmbedderBackend};
    use crate::model_files::{truncation_length, ModelFiles};
    use crate::pooling::{l2_normalize_rows, PoolingStrategy};

    /// Intra-op threads for CPU execution.
    const INTRA_THREADS: usize = 4;

    /// Optional BERT-style segment input; MPNet-family graphs do not declare it.
    const TOKEN_TYPE_IDS: &str = "token_type_ids";

    /// Text used to learn the output dimension at load time.
    const WARMUP_TEXT: &str = "dimension check";

    /// ONNX sentence embedding engine.
    pub struct OnnxEmbedder {
        session: Mutex<Session>,
        tokenizer: Tokenizer,
        pooling: PoolingStrategy,
        needs_token_type_ids: bool,
        model_id: String,
        device: ComputeDevice,
        dimension: usize,
    }

    impl std::fmt::Debug for OnnxEmbedder {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("OnnxEmbedder")
                .field("model_id", &self.model_id)
                .field("device", &self.device)
                .field("dimension", &self.dimension)
                .field("pooling", &self.pooling)
                .finish_non_exhaustive()
        }
    }

    impl OnnxEmbedder {
        /// Resolve `model_id` (local directory or hub repo) and load it.
        pub fn load(model_id: &str, preference: DevicePreference) -> Result<Self> {
            let files = ModelFiles::resolve(model_id)?;
            Self::from_files(model_id, &files, preference)
        }

        /// Load an embedder from already resolved files.
        ///
        /// Runs one warm-up inference before returning so a model that cannot
        /// produce embeddings never reaches the request path.
        pub fn from_files(
            model_id: &str,
            files: &ModelFiles,
            preference: DevicePreference,
        ) -> Result<Self> {
            // With load-dynamic, ORT_DYLIB_PATH may point at libonnxruntime.
            if let Err(e) = ort::init().with_name("embedserve").commit() {
                warn!("ONNX Runtime environment init failed: {}", e);
            }

            let device = select_device(preference)?;
            let (session, device) = match build_session(&files.model, device) {
                Ok(session) => (session, device),
                Err(e) if device == ComputeDevice::Accelerator
                    && preference == DevicePreference::Auto =>
                {
                    warn!("CUDA session failed: {}. Falling back to CPU.", e);
                    (build_session(&files.model, ComputeDevice::Cpu)?, ComputeDevice::Cpu)
                }
                Err(e) => return Err(e),
            };

            let needs_token_type_ids = session
                .inputs
                .iter()
                .any(|input| input.name == TOKEN_TYPE_IDS);

            let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
                .map_err(|e| Error::ModelLoad(format!("Failed to load tokenizer: {}", e)))?;
            let mut truncation = tokenizer.get_truncation().cloned().unwrap_or_default();
            truncation.max_length = truncation_length(
                files.max_seq_length()?,
                tokenizer.get_truncation().map(|t| t.max_length),
            );
            debug!("Truncating inputs to {} tokens", truncation.max_length);
            tokenizer
                .with_truncation(Some(truncation))
                .map_err(|e| Error::ModelLoad(format!("Failed to configure truncation: {}", e)))?;

            let pooling = match &files.pooling_config {
                Some(path) => PoolingStrategy::from_config_file(path)?,
                None => PoolingStrategy::Mean,
            };

            let mut embedder = Self {
                session: Mutex::new(session),
                tokenizer,
                pooling,
                needs_token_type_ids,
                model_id: model_id.to_string(),
                device,
                dimension: 0,
            };

            let warmup = embedder
                .run_batch(&[WARMUP_TEXT])
                .map_err(|e| Error::ModelLoad(format!("Warm-up inference failed: {}", e)))?;
            embedder.dimension = warmup.ncols();
            if embedder.dimension == 0 {
                return Err(Error::ModelLoad("Model produced empty embeddings".into()));
            }

            info!(
                "ONNX embedder loaded: model={}, device={}, dim={}, pooling={:?}, file={}",
                embedder.model_id,
                embedder.device,
                embedder.dimension,
                embedder.pooling,
                files.model.display()
            );

            Ok(embedder)
        }

        /// Tokenize, run and pool one batch. Rows are L2-normalized.
        fn run_batch(&self, texts: &[&str]) -> Result<Array2<f32>> {
            let encodings = self
                .tokenizer
                .encode_batch(texts.to_vec(), true)
                .map_err(|e| Error::Inference(format!("Tokenization failed: {}", e)))?;

            let rows = encodings.len();
            let seq_len = encodings
                .iter()
                .map(|enc| enc.get_ids().len())
                .max()
                .unwrap_or(0)
                .max(1);

            // Pad every row to the longest sequence in the batch.
            let mut ids_data = vec![0i64; rows * seq_len];
            let mut mask_data = vec![0i64; rows * seq_len];
            for (row, enc) in encodings.iter().enumerate() {
                let offset = row * seq_len;
                for (col, (&id, &m)) in enc
                    .get_ids()
                    .iter()
                    .zip(enc.get_attention_mask())
                    .enumerate()
                {
                    ids_data[offset + col] = id as i64;
                    mask_data[offset + col] = m as i64;
                }
            }

            let shape = [rows, seq_len];
            let ids_tensor = Tensor::from_array((shape, ids_data))
                .map_err(|e| Error::Inference(format!("Failed to create ids tensor: {}", e)))?;
            let mask_tensor = Tensor::from_array((shape, mask_data.clone()))
                .map_err(|e| Error::Inference(format!("Failed to create mask tensor: {}", e)))?;

            let mut inputs = ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
            ];
            if self.needs_token_type_ids {
                let type_ids_tensor = Tensor::from_array((shape, vec![0i64; rows * seq_len]))
                    .map_err(|e| {
                        Error::Inference(format!("Failed to create type_ids tensor: {}", e))
                    })?;
                inputs.push((TOKEN_TYPE_IDS.into(), type_ids_tensor.into()));
            }

            let mut session = self.session.lock();
            let outputs = session
                .run(inputs)
                .map_err(|e| Error::Inference(format!("ONNX inference failed: {}", e)))?;

            // Sentence-transformers exports put either token embeddings
            // [batch, seq_len, dim] or pooled embeddings [batch, dim] first.
            let (out_shape, data) = outputs[0].try_extract_tensor::<f32>().map_err(|e| {
                Error::Inference(format!("Failed to extract output tensor: {}", e))
            })?;
            let dims: Vec<usize> = out_shape.iter().map(|&d| d as usize).collect();
            debug!("Output shape {:?} for {} texts", dims, rows);

            let mut pooled = match dims.as_slice() {
                &[batch, seq, dim] if batch == rows && seq == seq_len => {
                    let tokens = ArrayView3::from_shape((batch, seq, dim), data)
                        .map_err(|e| Error::Inference(e.to_string()))?;
                    let mask = ArrayView2::from_shape((rows, seq_len), &mask_data)
                        .map_err(|e| Error::Inference(e.to_string()))?;
                    self.pooling.pool(tokens, mask)
                }
                &[batch, dim] if batch == rows => ArrayView2::from_shape((batch, dim), data)
                    .map_err(|e| Error::Inference(e.to_string()))?
                    .to_owned(),
                other => {
                    return Err(Error::Inference(format!(
                        "Unexpected output shape {:?} for batch of {} (seq_len {})",
                        other, rows, seq_len
                    )))
                }
            };

            l2_normalize_rows(&mut pooled);
            Ok(pooled)
        }
    }

    impl EmbedderBackend for OnnxEmbedder {
        fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            encode_in_batches(texts, self.dimension, |batch| self.run_batch(batch))
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_id(&self) -> &str {
            &self.model_id
        }

        fn device(&self) -> ComputeDevice {
            self.device
        }
    }

    /// Pick the device for a preference.
    fn select_device(preference: DevicePreference) -> Result<ComputeDevice> {
        match preference {
            DevicePreference::Cpu => Ok(ComputeDevice::Cpu),
            DevicePreference::Accelerator => {
                if cuda_available() {
                    Ok(ComputeDevice::Accelerator)
                } else {
                    Err(Error::ModelLoad(
                        "EMBEDDING_DEVICE=cuda but the CUDA execution provider is unavailable"
                            .into(),
                    ))
                }
            }
            DevicePreference::Auto => {
                if accelerator_present() && cuda_available() {
                    Ok(ComputeDevice::Accelerator)
                } else {
                    Ok(ComputeDevice::Cpu)
                }
            }
        }
    }

    fn cuda_available() -> bool {
        match CUDAExecutionProvider::default().is_available() {
            Ok(available) => available,
            Err(e) => {
                debug!("CUDA availability check failed: {}", e);
                false
            }
        }
    }

    fn build_session(model_path: &Path, device: ComputeDevice) -> Result<Session> {
        let load_err = |what: &str, e: &dyn std::fmt::Display| {
            Error::ModelLoad(format!("Failed to {}: {}", what, e))
        };

        let builder = Session::builder().map_err(|e| load_err("create session builder", &e))?;
        let builder = match device {
            ComputeDevice::Accelerator => builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .build()
                    .error_on_failure()])
                .map_err(|e| load_err("register CUDA execution provider", &e))?,
            ComputeDevice::Cpu => builder
                .with_execution_providers([CPUExecutionProvider::default().build()])
                .map_err(|e| load_err("register CPU execution provider", &e))?,
        };

        builder
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_err("set optimization level", &e))?
            .with_intra_threads(INTRA_THREADS)
            .map_err(|e| load_err("set threads", &e))?
            .commit_from_file(model_path)
            .map_err(|e| {
                load_err(&format!("load ONNX model {}", model_path.display()), &e)
            })
    }
}

#[cfg(feature = "onnx")]
pub use inner::OnnxEmbedder;
