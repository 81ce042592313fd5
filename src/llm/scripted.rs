//! In-process provider for tests: answers by pipeline stage and records every
//! request it receives.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{GenerateRequest, GenerateResponse, LlmClient, Provider};

type Responder = Box<dyn Fn(&GenerateRequest) -> anyhow::Result<String> + Send + Sync>;

pub struct ScriptedProvider {
    responders: HashMap<String, Responder>,
    default: Responder,
    calls: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedProvider {
    /// Every stage answers with a short echo of its own name.
    pub fn new() -> Self {
        Self {
            responders: HashMap::new(),
            default: Box::new(|req| Ok(format!("{} response", req.stage))),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails with a transport-style error.
    pub fn failing() -> Self {
        Self::new().fallback(|_| Err(anyhow::anyhow!("connection refused")))
    }

    pub fn on(mut self, stage: &str, reply: &str) -> Self {
        let reply = reply.to_string();
        self.responders
            .insert(stage.to_string(), Box::new(move |_| Ok(reply.clone())));
        self
    }

    pub fn on_fail(mut self, stage: &str) -> Self {
        let stage_name = stage.to_string();
        self.responders.insert(
            stage.to_string(),
            Box::new(move |_| Err(anyhow::anyhow!("503 service unavailable for {stage_name}"))),
        );
        self
    }

    pub fn fallback(
        mut self,
        f: impl Fn(&GenerateRequest) -> anyhow::Result<String> + Send + Sync + 'static,
    ) -> Self {
        self.default = Box::new(f);
        self
    }

    pub fn calls(&self) -> Vec<GenerateRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn stages(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.stage).collect()
    }

    pub fn prompts_for(&self, stage: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.stage == stage)
            .map(|c| c.prompt)
            .collect()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        self.calls.lock().unwrap().push(req.clone());
        let responder = self.responders.get(&req.stage).unwrap_or(&self.default);
        let content = responder(req)?;
        Ok(GenerateResponse {
            content,
            model: req.model.clone(),
            input_tokens: 10,
            output_tokens: 5,
            cost_usd: 0.0,
            finish_reason: "stop".to_string(),
            provider: String::new(),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn client(provider: &Arc<ScriptedProvider>) -> LlmClient {
    LlmClient::new(provider.clone(), "scripted")
}
