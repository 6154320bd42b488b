//! Quantized Llama 3.2 inference via Candle.
//!
//! Based on: https://github.com/huggingface/candle/tree/main/candle-examples/examples/quantized

use std::path::PathBuf;

use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::quantized_llama::ModelWeights;
use hf_hub::api::sync::ApiBuilder;
use tokenizers::Tokenizer;

use crate::config::LocalConfig;
use crate::dispatch::local::{ModelLoader, TextGenerator};
use crate::dispatch::{ChatMessage, Role, SamplingParams};
use crate::error::AsistenteError;

/// Rotary table length of `quantized_llama`; prompt plus reply must fit.
const MAX_SEQ_LEN: usize = 4096;

/// Headroom for tokens merging differently once content is cut.
const TRUNCATION_SLACK: usize = 16;

const EOT_TOKEN: &str = "<|eot_id|>";

pub struct CandleLoader {
    config: LocalConfig,
}

impl CandleLoader {
    pub fn new(config: LocalConfig) -> Self {
        Self { config }
    }

    fn fetch(&self) -> Result<(PathBuf, PathBuf), AsistenteError> {
        let api = ApiBuilder::new()
            .with_token(self.config.hf_token.clone())
            .build()
            .map_err(|e| AsistenteError::ModelLoad(format!("hf-hub init failed: {e}")))?;

        let weights = api
            .model(self.config.model_repo.clone())
            .get(&self.config.model_file)
            .map_err(|e| {
                AsistenteError::ModelLoad(format!("download {} failed: {e}", self.config.model_file))
            })?;
        let tokenizer = api
            .model(self.config.tokenizer_repo.clone())
            .get("tokenizer.json")
            .map_err(|e| AsistenteError::ModelLoad(format!("tokenizer download failed: {e}")))?;

        Ok((weights, tokenizer))
    }
}

impl ModelLoader for CandleLoader {
    fn describe(&self) -> String {
        format!("{}/{}", self.config.model_repo, self.config.model_file)
    }

    fn load(&self) -> Result<Box<dyn TextGenerator>, AsistenteError> {
        let (weights_path, tokenizer_path) = self.fetch()?;

        let device = Device::cuda_if_available(0).map_err(load_err)?;
        tracing::info!("using device: {}", if device.is_cuda() { "cuda" } else { "cpu" });

        let mut file = std::fs::File::open(&weights_path).map_err(|e| {
            AsistenteError::ModelLoad(format!("cannot open {}: {e}", weights_path.display()))
        })?;
        let content = gguf_file::Content::read(&mut file).map_err(load_err)?;
        let model = ModelWeights::from_gguf(content, &mut file, &device).map_err(load_err)?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| AsistenteError::ModelLoad(format!("tokenizer: {e}")))?;
        let eot = tokenizer.token_to_id(EOT_TOKEN);

        Ok(Box::new(CandleGenerator {
            model,
            tokenizer,
            device,
            eot,
            seed: self.config.seed,
        }))
    }
}

pub struct CandleGenerator {
    model: ModelWeights,
    tokenizer: Tokenizer,
    device: Device,
    eot: Option<u32>,
    seed: u64,
}

impl TextGenerator for CandleGenerator {
    fn generate(
        &mut self,
        messages: &[ChatMessage],
        sampling: &SamplingParams,
    ) -> Result<String, AsistenteError> {
        let max_tokens = sampling.max_tokens as usize;
        let budget = MAX_SEQ_LEN.saturating_sub(max_tokens);
        let tokens = self.prompt_tokens(messages, budget)?;

        let mut sampler = LogitsProcessor::from_sampling(self.seed, sampling_for(sampling));

        let input = Tensor::new(tokens.as_slice(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(gen_err)?;
        let logits = self
            .model
            .forward(&input, 0)
            .and_then(|l| l.squeeze(0))
            .map_err(gen_err)?;
        let mut next = sampler.sample(&logits).map_err(gen_err)?;

        let mut generated = Vec::new();
        for index in 0..max_tokens {
            if Some(next) == self.eot {
                break;
            }
            generated.push(next);
            if index + 1 == max_tokens {
                break;
            }
            let input = Tensor::new(&[next], &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(gen_err)?;
            let logits = self
                .model
                .forward(&input, tokens.len() + index)
                .and_then(|l| l.squeeze(0))
                .map_err(gen_err)?;
            next = sampler.sample(&logits).map_err(gen_err)?;
        }

        let text = self
            .tokenizer
            .decode(&generated, true)
            .map_err(|e| AsistenteError::Generation(format!("detokenize: {e}")))?;
        Ok(text.trim().to_string())
    }
}

impl CandleGenerator {
    fn encode(&self, text: &str) -> Result<tokenizers::Encoding, AsistenteError> {
        self.tokenizer
            .encode(text, false)
            .map_err(|e| AsistenteError::Generation(format!("tokenize: {e}")))
    }

    /// Template tokens for `messages`, cutting the tail of system and then user
    /// content until the prompt fits in `budget`. Template markers are kept.
    fn prompt_tokens(
        &self,
        messages: &[ChatMessage],
        budget: usize,
    ) -> Result<Vec<u32>, AsistenteError> {
        let tokens = self.encode(&llama3_prompt(messages))?.get_ids().to_vec();
        if tokens.len() <= budget {
            return Ok(tokens);
        }

        let mut overflow = tokens.len() - budget + TRUNCATION_SLACK;
        let mut fitted = messages.to_vec();
        for role in [Role::System, Role::User] {
            for message in fitted.iter_mut().filter(|m| m.role == role) {
                if overflow == 0 {
                    break;
                }
                let encoding = self.encode(&message.content)?;
                let count = encoding.len();
                let keep = count.saturating_sub(overflow);
                message.content =
                    truncate_at_token(&message.content, encoding.get_offsets(), keep).to_string();
                overflow -= count - keep;
            }
        }
        tracing::warn!(
            prompt_tokens = tokens.len(),
            budget,
            "prompt exceeds the context window, truncating context"
        );

        let tokens = self.encode(&llama3_prompt(&fitted))?.get_ids().to_vec();
        if tokens.len() > budget {
            return Err(AsistenteError::Generation(format!(
                "prompt needs {} tokens, only {budget} fit",
                tokens.len()
            )));
        }
        Ok(tokens)
    }
}

/// Prefix of `content` holding its first `keep` tokens, given each token's
/// byte offsets.
fn truncate_at_token<'a>(content: &'a str, offsets: &[(usize, usize)], keep: usize) -> &'a str {
    let Some(&(start, _)) = offsets.get(keep) else {
        return content;
    };
    let mut end = start.min(content.len());
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    content[..end].trim_end()
}

/// Llama 3 chat template, ending with an open assistant header.
fn llama3_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = String::from("<|begin_of_text|>");
    for m in messages {
        prompt.push_str("<|start_header_id|>");
        prompt.push_str(m.role.as_str());
        prompt.push_str("<|end_header_id|>\n\n");
        prompt.push_str(&m.content);
        prompt.push_str(EOT_TOKEN);
    }
    prompt.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
    prompt
}

fn sampling_for(params: &SamplingParams) -> Sampling {
    if params.temperature <= 0.0 {
        Sampling::ArgMax
    } else {
        Sampling::TopKThenTopP {
            k: params.top_k as usize,
            p: params.top_p,
            temperature: params.temperature,
        }
    }
}

fn load_err(e: candle_core::Error) -> AsistenteError {
    AsistenteError::ModelLoad(e.to_string())
}

fn gen_err(e: candle_core::Error) -> AsistenteError {
    AsistenteError::Generation(e.to_string())
}
