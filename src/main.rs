use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kenzy_bus::{Bus, Command, Context, LocalDispatch, REREGISTER_INTERVAL};
use kenzy_config::{KenzyConfig, StanzaConfig, UpnpMode};
use kenzy_devices::{
    DeviceKind, HubSink, ImageDevice, LlmDevice, RestartSignal, SinkAttachable, SkillsDevice,
    Supervisor, SttDevice, SttSettings, TtsDevice,
};
use kenzy_discovery::{DiscoveryService, Mode};
use kenzy_registry::{AskTable, PeerRegistry};
use kenzy_transport::{AppState, HttpOutboundSender, TlsFiles};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::EnvFilter;

const APP_NAME: &str = "kenzy";
const APP_TITLE: &str = "Kenzy";
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Mirrors the original `__main__.py`'s argument parser: a config path, an
/// optional type/upnp override for single-stanza runs, offline mode, and a
/// log level.
#[derive(Parser)]
#[command(name = APP_NAME, version = VERSION, about = APP_TITLE)]
struct Cli {
    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Specify instance type (overrides the config value if set)
    #[arg(short = 't', long = "type")]
    device_type: Option<String>,

    /// Enable UPNP as server, client, or standalone
    #[arg(long)]
    upnp: Option<String>,

    /// Run in offline mode (no outbound model downloads)
    #[arg(long)]
    offline: bool,

    /// Options are full, debug, info, warning, error, and critical
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    let level = match level.trim().to_lowercase().as_str() {
        "full" | "debug" => "debug",
        "warning" => "warn",
        "critical" => "error",
        "error" => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("{APP_NAME}={level},{level}")))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if cli.offline {
        // SAFETY: single-threaded at this point in startup, before any
        // model backend reads these.
        unsafe {
            std::env::set_var("TRANSFORMERS_OFFLINE", "1");
            std::env::set_var("HF_DATASETS_OFFLINE", "1");
        }
    }

    let mut config = match kenzy_config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            log::error!("unable to load configuration: {err}");
            std::process::exit(1);
        }
    };

    if config.is_multi() {
        run_multi(config).await;
        return;
    }

    if let Some(device_type) = &cli.device_type {
        config.device_type = device_type.clone();
    }

    if let Some(upnp) = &cli.upnp {
        match upnp.to_lowercase().as_str() {
            "server" => config.service.upnp.mode = UpnpMode::Server,
            "client" => config.service.upnp.mode = UpnpMode::Client,
            "standalone" => config.service.upnp.mode = UpnpMode::Standalone,
            _ => {
                log::error!("invalid --upnp value; must be one of server, client, standalone");
                std::process::exit(1);
            }
        }
    }

    if config.device_type.trim().is_empty() {
        log::error!("unable to identify instance type (use --type to specify)");
        std::process::exit(1);
    }

    let stanza = StanzaConfig {
        device_type: config.device_type.clone(),
        service: config.service.clone(),
        device: config.device.clone(),
    };

    if let Err(err) = startup(stanza).await {
        log::error!("fatal startup error: {err:#}");
        std::process::exit(1);
    }
}

/// Spawns one child process per resolved stanza, re-execing this same binary
/// against a generated single-stanza config file. Process isolation (rather
/// than the original's thread pool) keeps model libraries with global state
/// from colliding between device kinds sharing one process.
async fn run_multi(config: KenzyConfig) {
    let resolved = match kenzy_config::resolve_stanzas(&config) {
        Ok(resolved) => resolved,
        Err(err) => {
            log::error!("unable to resolve multi-stanza configuration: {err}");
            std::process::exit(1);
        }
    };

    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(err) => {
            log::error!("unable to locate current executable: {err}");
            std::process::exit(1);
        }
    };

    let spool_dir = std::env::temp_dir().join(format!("kenzy-multi-{}", std::process::id()));
    if let Err(err) = std::fs::create_dir_all(&spool_dir) {
        log::error!("unable to create stanza spool directory: {err}");
        std::process::exit(1);
    }

    let mut children = Vec::new();

    for item in resolved {
        let stanza_config = KenzyConfig {
            device_type: item.stanza.device_type.clone(),
            service: item.stanza.service.clone(),
            device: item.stanza.device.clone(),
            default: None,
            stanzas: Default::default(),
        };

        let stanza_path = spool_dir.join(format!("{}.yml", item.name));
        if let Err(err) = kenzy_config::save(&stanza_config, &stanza_path) {
            log::error!("unable to write stanza config for {}: {err}", item.name);
            continue;
        }

        match std::process::Command::new(&exe).arg("-c").arg(&stanza_path).spawn() {
            Ok(child) => {
                log::info!("spawned {} ({})", item.name, item.stanza.device_type);
                let is_hub = item.stanza.device_type == "kenzy.skillmanager";
                children.push(child);
                if is_hub {
                    // Let the hub get fully online before its peers start
                    // trying to register against it.
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
            Err(err) => log::error!("unable to spawn stanza {}: {err}", item.name),
        }
    }

    for mut child in children {
        let _ = child.wait();
    }

    let _ = std::fs::remove_dir_all(&spool_dir);
}

/// Bridges a `Bus` back into `Supervisor`'s `LocalDispatch` expectations so
/// the supervisor can ask for a restart through the same command path a
/// remote peer would use.
struct BusDeviceHandle(Arc<Bus>);

#[async_trait::async_trait]
impl LocalDispatch for BusDeviceHandle {
    fn accepts(&self) -> Vec<String> {
        vec!["restart".into()]
    }

    async fn invoke(&self, action: &str, payload: Value, context: &Context) -> kenzy_bus::Response {
        self.0.command(action, payload, context.clone()).await
    }
}

/// Builds and runs a single device process: constructs the device, wires it
/// to a `Bus`, starts discovery, registers with the hub if this isn't one,
/// and serves the HTTP API until shutdown is requested.
async fn startup(stanza: StanzaConfig) -> anyhow::Result<()> {
    let kind = DeviceKind::from_type(&stanza.device_type)
        .ok_or_else(|| anyhow::anyhow!("unknown device type: {}", stanza.device_type))?;

    if stanza.service.ssl.enable {
        rustls::crypto::ring::default_provider()
            .install_default()
            .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;
    }

    let proto = if stanza.service.ssl.enable { "https" } else { "http" };
    let ip_addr = if stanza.service.host == "0.0.0.0" {
        kenzy_discovery::primary_ipv4()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "127.0.0.1".to_string())
    } else {
        stanza.service.host.clone()
    };
    let local_url = format!("{proto}://{ip_addr}:{}", stanza.service.port);

    let usn_uuid = uuid::Uuid::new_v4().to_string();
    let upnp_mode = match stanza.service.upnp.mode {
        UpnpMode::Server => Mode::Server,
        UpnpMode::Client => Mode::Client,
        UpnpMode::Standalone => Mode::Standalone,
    };
    let discovery = Arc::new(
        DiscoveryService::new(upnp_mode, usn_uuid.clone(), format!("{APP_TITLE} {VERSION}"))
            .with_client_window(Duration::from_secs(stanza.service.upnp.timeout)),
    );

    let initial_service_url = stanza
        .service
        .service_url
        .clone()
        .unwrap_or_else(|| local_url.clone());
    let service_url = discovery.start(&initial_service_url).await?;

    let restart = RestartSignal::new();
    let registry = Arc::new(PeerRegistry::new());
    let ask_table = Arc::new(AskTable::<Context>::new());
    let shutdown = CancellationToken::new();
    let outbound = Arc::new(HttpOutboundSender::new());

    let device_config = stanza.device.clone();
    let mut skills_device: Option<Arc<SkillsDevice>> = None;
    let mut sink_attachable: Option<Arc<dyn SinkAttachable + Send + Sync>> = None;

    let local: Arc<dyn LocalDispatch> = match kind {
        DeviceKind::Stt => {
            let settings: SttSettings = device_config
                .get("settings")
                .cloned()
                .map(serde_json::from_value)
                .transpose()?
                .unwrap_or_default();
            let device = Arc::new(SttDevice::new(
                settings,
                Arc::new(kenzy_devices::traits::NullAudioSource),
                Arc::new(kenzy_devices::traits::NullWakeDetector),
                Arc::new(kenzy_devices::traits::StubTranscriber {
                    fixed_text: String::new(),
                }),
                Arc::new(kenzy_devices::NoopSink),
                restart.clone(),
            ));
            sink_attachable = Some(device.clone());
            device
        }
        DeviceKind::Tts => {
            let speaker = device_config
                .get("speaker")
                .and_then(Value::as_str)
                .unwrap_or("default")
                .to_string();
            Arc::new(TtsDevice::new(speaker, Arc::new(kenzy_devices::traits::NullSynthesizer)))
        }
        DeviceKind::Skills => {
            let wake_words: Vec<String> = device_config
                .get("wake_words")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            let activation_timeout = Duration::from_secs(
                device_config
                    .get("activation_timeout")
                    .and_then(Value::as_u64)
                    .unwrap_or(45),
            );
            let device = Arc::new(SkillsDevice::new(
                wake_words,
                activation_timeout,
                Arc::new(kenzy_devices::traits::NullIntentMatcher),
                Vec::new(),
            ));
            skills_device = Some(device.clone());
            device
        }
        DeviceKind::Image => {
            let device = Arc::new(ImageDevice::new(
                Arc::new(kenzy_devices::traits::NullVideoSource),
                Arc::new(kenzy_devices::traits::NullMotionDetector),
                Arc::new(kenzy_devices::traits::NullObjectDetector),
                Arc::new(kenzy_devices::traits::NullFaceDetector),
                Arc::new(kenzy_devices::NoopSink),
                restart.clone(),
            ));
            sink_attachable = Some(device.clone());
            device
        }
        DeviceKind::Llm => {
            let fixed_reply = device_config
                .get("fixed_reply")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            Arc::new(LlmDevice::new(Arc::new(kenzy_devices::traits::StubLlmBackend { fixed_reply })))
        }
    };

    let accepts = local.accepts();

    let bus = Arc::new(Bus::new(
        local_url.clone(),
        service_url.clone(),
        registry,
        ask_table,
        local,
        outbound,
        shutdown.clone(),
    ));

    if let Some(sink_device) = sink_attachable {
        sink_device.attach_sink(Arc::new(HubSink::new(Arc::downgrade(&bus))));
    }
    if let Some(skills) = &skills_device {
        skills.attach(&bus);
    }

    bus.command("start", Value::Null, bus.local_context()).await;

    let mut reregister_task = None;
    if !bus.is_hub() {
        let device_type_for_register = stanza.device_type.clone();
        bus.send_request(
            Command::register(local_url.clone(), device_type_for_register.clone(), accepts.clone()),
            true,
        )
        .await;

        reregister_task = Some(tokio::spawn(reregister_loop(
            bus.clone(),
            discovery.clone(),
            local_url.clone(),
            device_type_for_register,
            accepts,
            service_url.clone(),
            shutdown.clone(),
        )));
    }

    let app_state = Arc::new(AppState {
        bus: bus.clone(),
        local_url: local_url.clone(),
        service_url: service_url.clone(),
        api_key: stanza.service.api_key.clone(),
        server_uuid: usn_uuid,
        version: VERSION.to_string(),
        app_name: APP_NAME.to_string(),
        app_title: APP_TITLE.to_string(),
    });

    let tls = if stanza.service.ssl.enable {
        Some(TlsFiles {
            cert_file: stanza.service.ssl.cert_file.clone().unwrap_or_default(),
            key_file: stanza.service.ssl.key_file.clone().unwrap_or_default(),
        })
    } else {
        None
    };

    let addr: SocketAddr = format!("{}:{}", stanza.service.host, stanza.service.port).parse()?;
    let server_shutdown = shutdown.clone();
    let server_task = tokio::spawn(async move {
        tokio::select! {
            _ = server_shutdown.cancelled() => {}
            result = kenzy_transport::serve(addr, app_state, tls) => {
                if let Err(err) = result {
                    log::error!("transport error: {err}");
                }
            }
        }
    });

    let supervisor = Supervisor::new(Arc::new(BusDeviceHandle(bus.clone())), restart);
    let supervisor_cancel = shutdown.clone();
    let supervisor_task = tokio::spawn(async move {
        supervisor.run(supervisor_cancel).await;
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutdown requested");
        }
        _ = shutdown.cancelled() => {
            log::info!("shutdown commanded");
        }
    }

    shutdown.cancel();
    discovery.stop(&service_url).await;
    bus.command("stop", Value::Null, bus.local_context()).await;
    supervisor_task.abort();
    server_task.abort();
    if let Some(task) = reregister_task {
        task.abort();
    }

    Ok(())
}

/// Re-sends `register` to the hub every [`REREGISTER_INTERVAL`] — the
/// fabric's sole health signal for a peer. A failed send means the hub
/// moved or dropped, so this re-resolves `service_url` through discovery
/// before the next attempt.
async fn reregister_loop(
    bus: Arc<Bus>,
    discovery: Arc<DiscoveryService>,
    local_url: String,
    device_type: String,
    accepts: Vec<String>,
    mut service_url: String,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(REREGISTER_INTERVAL) => {}
        }

        let cmd = Command::register(local_url.clone(), device_type.clone(), accepts.clone())
            .with_url(service_url.clone());
        let ok = bus.send_request(cmd, true).await;

        if !ok {
            log::warn!("re-register against {service_url} failed, re-resolving via discovery");
            match discovery.start(&service_url).await {
                Ok(resolved) => service_url = resolved,
                Err(err) => log::error!("discovery re-resolve failed: {err}"),
            }
        }
    }
}
