#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use nexus_gateway::config::EngineConfig;
use nexus_gateway::engine::EngineContext;
use nexus_gateway::engine::state::Readiness;
use nexus_gateway::engine::supervisor::Supervisor;
use nexus_gateway::loader::IndicatorSource;
use nexus_gateway::loader::mock::{MockRow, MockSource};
use nexus_gateway::validate::RawIndicator;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Speaks the engine protocol. Answers every query with the number of
/// loads it has seen; `Q ZZ` makes it crash without answering and `Q SL`
/// answers after 300ms.
pub const ECHO_ENGINE: &str = r#"
n=0
while IFS= read -r line; do
  case "$line" in
    "L "*) n=$((n+1)) ;;
    "Q ZZ") exit 3 ;;
    "Q SL") sleep 0.3; printf '{"status":"success","data":{"estado":"SL","loaded":%d}}\n' "$n" ;;
    "Q "*) printf '{"status":"success","data":{"estado":"%s","loaded":%d}}\n' "${line#Q }" "$n" ;;
    X) exit 0 ;;
  esac
done
"#;

/// Reads commands forever and never answers, not even `X`.
pub const SILENT_ENGINE: &str = "while IFS= read -r line; do :; done";

pub const WAIT: Duration = Duration::from_secs(10);

pub fn sh_engine(script: &str) -> EngineConfig {
    let mut config = EngineConfig::new("sh");
    config.args = vec!["-c".to_string(), script.to_string()];
    config.restart_delay_secs = 1;
    config.query_timeout_ms = 1000;
    config
}

pub fn raw(code: &str) -> RawIndicator {
    RawIndicator {
        region_code: code.to_string(),
        sub_region: "Regiao Metropolitana".to_string(),
        value_region: 10.5,
        value_macro_region: 20.25,
        value_national: 30.0,
        reference_date: "202310".to_string(),
        updated_date: "20231101".to_string(),
    }
}

/// Five rows, two with invalid region codes.
pub fn mixed_source() -> Arc<dyn IndicatorSource> {
    Arc::new(MockSource::new(vec![
        MockRow::Row(raw("SP")),
        MockRow::Row(raw("rj")),
        MockRow::Row(raw("São Paulo")),
        MockRow::Row(raw("MG")),
        MockRow::Row(raw("BRA")),
    ]))
}

pub struct Harness {
    pub ctx: Arc<EngineContext>,
    pub shutdown: watch::Sender<bool>,
    pub task: JoinHandle<()>,
}

impl Harness {
    pub fn start(config: EngineConfig, source: Arc<dyn IndicatorSource>) -> Self {
        let ctx = Arc::new(EngineContext::new(config.query_timeout()));
        let (shutdown, rx) = watch::channel(false);
        let supervisor = Supervisor::new(Arc::clone(&ctx), config, source);
        let task = tokio::spawn(supervisor.run(rx));
        Self { ctx, shutdown, task }
    }

    pub async fn wait_for(&self, want: Readiness) {
        let mut rx = self.ctx.state.subscribe();
        tokio::time::timeout(WAIT, rx.wait_for(|r| *r == want))
            .await
            .unwrap_or_else(|_| panic!("engine never became {want}"))
            .unwrap();
    }

    pub async fn wait_for_generation(&self, generation: u64) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while self.ctx.state.generation() < generation {
            assert!(
                tokio::time::Instant::now() < deadline,
                "generation {generation} never started"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub async fn stop(self) {
        self.shutdown.send(true).unwrap();
        tokio::time::timeout(WAIT, self.task)
            .await
            .expect("supervisor did not stop")
            .unwrap();
    }
}

/// Query `code` until the engine reports `loaded` rows.
pub async fn wait_until_loaded(ctx: &EngineContext, code: &str, loaded: u64) -> serde_json::Value {
    let code = nexus_gateway::validate::RegionCode::parse(code).unwrap();
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if let Ok(reply) = ctx.pipe.query(&code).await {
            let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
            if value["data"]["loaded"] == loaded {
                return value;
            }
        }
        assert!(tokio::time::Instant::now() < deadline, "load never reached {loaded}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
