#![deny(warnings)]
#![warn(unused_extern_crates)]
// Enable some groups of clippy lints.
#![deny(clippy::suspicious)]
#![deny(clippy::perf)]
// Specific lints to enforce.
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]
#![deny(clippy::disallowed_types)]
#![deny(clippy::manual_let_else)]
#![allow(clippy::unreachable)]

mod config;

use clap::{Parser, Subcommand};
use config::{Config, CoreAction, ServerState, TaskName};
use futures::{SinkExt, StreamExt};
use krime_acceptor::keytab::{Keytab, KeytabEntry};
use krime_acceptor::proto::{
    ApReply, ApReq, ApResponse, PrincipalName, ReplayCache, ServiceKey, ValidationOutcome,
};
use krime_acceptor::ApTcpCodec;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, instrument, trace, warn};

fn respond(outcome: ValidationOutcome) -> Option<ApResponse> {
    match outcome {
        ValidationOutcome::Accepted(context) => match ApReply::for_context(&context) {
            Ok(reply) => Some(reply.into()),
            Err(err) => {
                error!(?err, "unable to build ap-rep");
                None
            }
        },
        ValidationOutcome::Rejected(reply) => Some(reply.into()),
        ValidationOutcome::TransportFailure => None,
    }
}

#[instrument(level = "info", skip_all, fields(%client_address))]
async fn acceptor_tcp_client_process(
    tcpstream: TcpStream,
    client_address: SocketAddr,
    server_state: Arc<ServerState>,
) {
    let mut ap_stream = Framed::new(tcpstream, ApTcpCodec::default());
    trace!("connection from");

    while let Some(Ok(ap_req)) = ap_stream.next().await {
        let outcome = server_state.validator.validate(
            &ap_req,
            &server_state.keytab,
            server_state.expected_service(),
            Some(client_address.ip()),
        );

        let Some(response) = respond(outcome) else {
            warn!("malformed ap-req, disconnecting");
            break;
        };

        if let Err(err) = ap_stream.send(response).await {
            error!(?err, "error writing response, disconnecting");
            break;
        }
    }
    debug!("closing client");
}

#[derive(Debug, clap::Parser)]
#[clap(about = "Krime Acceptor - Checks Your Tickets, Please")]
struct OptParser {
    #[clap(subcommand)]
    command: Opt,
}

#[derive(Debug, Subcommand)]
enum Opt {
    /// Accept AP-REQs over TCP.
    Run { config: PathBuf },
    /// Validate a single AP-REQ, DER or hex encoded, against the configured keytab.
    Check {
        config: PathBuf,
        input: PathBuf,
        /// Write the KRB-ERROR here if the AP-REQ is rejected.
        #[clap(long)]
        error_output: Option<PathBuf>,
    },
    /// Derive keys for a principal from a password and add them to a keytab.
    Keytab {
        name: String,
        realm: String,
        kvno: u32,
        output: PathBuf,
        #[clap(long, env = "KRIME_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

async fn acceptor_tcp_acceptor(
    listener: TcpListener,
    server_state: Arc<ServerState>,
    mut rx: broadcast::Receiver<CoreAction>,
) {
    info!("Started task {}", TaskName::AcceptorTcp);

    loop {
        tokio::select! {
            Ok(action) = rx.recv() => {
                match action {
                    CoreAction::Shutdown => break,
                }
            }
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((tcpstream, client_socket_addr)) => {
                        let state = server_state.clone();
                        tokio::spawn(async move {
                            acceptor_tcp_client_process(tcpstream, client_socket_addr, state).await
                        });
                    }
                    Err(e) => {
                        error!("Acceptor error, continuing -> {:?}", e);
                    }
                }
            }
        }
    }

    info!("Stopped task {}", TaskName::AcceptorTcp);
}

async fn replay_purge_task(
    replay_cache: Arc<ReplayCache>,
    period: Duration,
    mut rx: broadcast::Receiver<CoreAction>,
) {
    info!("Started task {}", TaskName::ReplayPurge);

    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            Ok(action) = rx.recv() => {
                match action {
                    CoreAction::Shutdown => break,
                }
            }
            _ = interval.tick() => {
                let purged = replay_cache.purge_expired(SystemTime::now());
                trace!(purged, remaining = replay_cache.len(), "replay cache purge");
            }
        }
    }

    info!("Stopped task {}", TaskName::ReplayPurge);
}

async fn create_acceptor_tcp_server(
    address: &str,
    server_state: Arc<ServerState>,
    rx: broadcast::Receiver<CoreAction>,
) -> Result<tokio::task::JoinHandle<()>, ()> {
    let addr = SocketAddr::from_str(address).map_err(|e| {
        error!("Could not parse acceptor address {} -> {:?}", address, e);
    })?;

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        error!("Could not bind to acceptor address {} -> {:?}", address, e);
    })?;

    Ok(tokio::spawn(acceptor_tcp_acceptor(
        listener,
        server_state,
        rx,
    )))
}

struct CoreHandle {
    clean_shutdown: bool,
    tx: broadcast::Sender<CoreAction>,
    handles: Vec<(TaskName, tokio::task::JoinHandle<()>)>,
}

impl CoreHandle {
    async fn shutdown(&mut self) {
        if self.tx.send(CoreAction::Shutdown).is_err() {
            eprintln!("No receivers acked shutdown request. Treating as unclean.");
            return;
        }

        // Wait on the handles.
        while let Some((handle_name, handle)) = self.handles.pop() {
            if let Err(error) = handle.await {
                eprintln!("Task {handle_name} failed to finish: {error:?}");
            }
        }

        self.clean_shutdown = true;
    }
}

impl Drop for CoreHandle {
    fn drop(&mut self) {
        if !self.clean_shutdown {
            eprintln!("⚠️  UNCLEAN SHUTDOWN OCCURRED ⚠️ ");
        }
        debug_assert!(self.clean_shutdown);
    }
}

async fn create_server_core(config: &Config) -> Result<CoreHandle, ()> {
    let (broadcast_tx, _broadcast_rx) = broadcast::channel(4);

    let server_state = ServerState::try_from(config).map(Arc::new).map_err(|e| {
        error!("Could not get server state from config -> {:?}", e);
    })?;

    let mut handles: Vec<(TaskName, tokio::task::JoinHandle<()>)> = vec![];

    let purge_handle = tokio::spawn(replay_purge_task(
        server_state.replay_cache.clone(),
        Duration::from_secs(config.purge_interval.max(1)),
        broadcast_tx.subscribe(),
    ));
    handles.push((TaskName::ReplayPurge, purge_handle));

    let acceptor_handle = create_acceptor_tcp_server(
        &config.address,
        server_state.clone(),
        broadcast_tx.subscribe(),
    )
    .await?;
    handles.push((TaskName::AcceptorTcp, acceptor_handle));

    Ok(CoreHandle {
        clean_shutdown: false,
        tx: broadcast_tx,
        handles,
    })
}

fn read_ap_req(input: &Path) -> io::Result<ApReq> {
    let raw = fs::read(input)?;

    // Hex dumps are accepted as well as raw DER.
    let der = match std::str::from_utf8(&raw)
        .ok()
        .and_then(|text| hex::decode(text.trim()).ok())
    {
        Some(der) => der,
        None => raw,
    };

    ApReq::from_der(&der).map_err(|err| {
        error!(?err, "Unable to parse ap-req");
        io::Error::new(io::ErrorKind::InvalidData, "ap-req")
    })
}

fn check_run(config: &Config, input: &Path, error_output: Option<&Path>) -> io::Result<bool> {
    let server_state = ServerState::try_from(config)
        .map_err(|_err| io::Error::new(io::ErrorKind::InvalidInput, "config"))?;

    let ap_req = read_ap_req(input)?;

    match server_state.validator.validate(
        &ap_req,
        &server_state.keytab,
        server_state.expected_service(),
        None,
    ) {
        ValidationOutcome::Accepted(context) => {
            println!(
                "accepted: {}@{} for {}@{}",
                context.client(),
                context.client_realm(),
                context.service(),
                context.service_realm()
            );
            Ok(true)
        }
        ValidationOutcome::Rejected(reply) => {
            println!("rejected: {:?}", reply.code());
            if let Some(path) = error_output {
                let der = reply
                    .to_der()
                    .map_err(|_err| io::Error::new(io::ErrorKind::InvalidData, "krb-error"))?;
                fs::write(path, der)?;
            }
            Ok(false)
        }
        ValidationOutcome::TransportFailure => {
            println!("malformed");
            Ok(false)
        }
    }
}

fn keytab_add_run(
    name: &str,
    realm: &str,
    kvno: u32,
    output: &Path,
    password: &str,
) -> io::Result<()> {
    let principal = PrincipalName::from_str(name)
        .map_err(|_err| io::Error::new(io::ErrorKind::InvalidInput, "principal name"))?;

    // RFC4120 default salt, the realm followed by the name components.
    let salt = format!("{realm}{}", principal.components().concat());

    let keys = [
        ServiceKey::new_aes256_cts_hmac_sha1_96(password, &salt, None, kvno),
        ServiceKey::new_aes128_cts_hmac_sha1_96(password, &salt, None, kvno),
    ];

    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or_default();

    let entries = keys
        .into_iter()
        .map(|key| {
            key.map(|key| KeytabEntry {
                principal: principal.clone(),
                realm: realm.to_string(),
                key,
                timestamp,
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_err| io::Error::new(io::ErrorKind::InvalidInput, "key derivation"))?;

    let ktname = format!("FILE:{}", output.display());
    let k: Keytab = if output.exists() {
        let mut keytab = krime_acceptor::keytab::load(Some(&ktname)).map_err(|err| {
            error!(?err, "Failed to load keytab file at {}", ktname);
            io::Error::new(io::ErrorKind::InvalidInput, "keytab")
        })?;
        keytab.extend(entries);
        keytab
    } else {
        entries
    };

    krime_acceptor::keytab::store(Some(&ktname), &k)
        .map_err(|_err| io::Error::new(io::ErrorKind::InvalidInput, "write"))?;

    info!(%principal, realm, kvno, "keys added to {}", output.display());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ()> {
    tracing_subscriber::fmt::init();

    let opt = OptParser::parse();

    match opt.command {
        Opt::Run { config } => {
            let cfg = Config::parse(&config).map_err(|e| {
                error!("Could not parse config file {:?}: {:?}", config, e);
            })?;

            let sctx = create_server_core(&cfg).await;
            match sctx {
                Ok(mut sctx) => {
                    loop {
                        let mut listener = sctx.tx.subscribe();
                        tokio::select! {
                            Ok(()) = tokio::signal::ctrl_c() => {
                                break
                            }
                            Some(()) = async move {
                                let sigterm = tokio::signal::unix::SignalKind::terminate();
                                #[allow(clippy::unwrap_used)]
                                tokio::signal::unix::signal(sigterm).unwrap().recv().await
                            } => {
                                break
                            }
                            Some(()) = async move {
                                let sighup = tokio::signal::unix::SignalKind::hangup();
                                #[allow(clippy::unwrap_used)]
                                tokio::signal::unix::signal(sighup).unwrap().recv().await
                            } => {
                                // Ignore
                            }
                            // we got a message on the broadcast from somewhere else
                            Ok(msg) = async move {
                                listener.recv().await
                            } => {
                                debug!("Main loop received message: {:?}", msg);
                                break
                            }
                        }
                    }
                    info!("Signal received, shutting down");
                    // Send a broadcast that we are done.
                    sctx.shutdown().await;
                }
                Err(_) => {
                    error!("Failed to start server core!");
                    return Err(());
                }
            }
        }
        Opt::Check {
            config,
            input,
            error_output,
        } => {
            let cfg = Config::parse(&config).map_err(|e| {
                error!("Could not parse config file {:?}: {:?}", config, e);
            })?;
            let accepted = check_run(&cfg, &input, error_output.as_deref()).map_err(|e| {
                error!("Could not check {:?}: {:?}", input, e);
            })?;
            if !accepted {
                return Err(());
            }
        }
        Opt::Keytab {
            name,
            realm,
            kvno,
            output,
            password,
        } => keytab_add_run(&name, &realm, kvno, &output, &password).map_err(|e| {
            error!(
                "Could not add principal {:?} to keytab {:?}: {:?}",
                name, output, e
            );
        })?,
    }

    Ok(())
}
