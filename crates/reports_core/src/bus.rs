//! Streaming message bus client and in-process broker.
//!
//! # Responsibility
//! - Resolve bus settings (`NATS_CLUSTER_ID`) from the environment.
//! - Provide an in-process broker with streaming-style semantics: named
//!   clusters, unique client ids, per-subject message sequences.
//!
//! # Invariants
//! - A client id is registered at most once per cluster.
//! - A dropped connection deregisters its client even without `close()`.
//! - Messages are only delivered to subscriptions that existed when they were
//!   published.

use crate::config::ConfigError;
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, oneshot};

pub const CLUSTER_ID_ENV: &str = "NATS_CLUSTER_ID";

const SUBJECT_BUFFER: usize = 256;

pub type BusResult<T> = Result<T, BusError>;

/// Bus client or broker failure.
#[derive(Debug)]
pub enum BusError {
    Config(ConfigError),
    NoRuntime,
    NoClusters,
    UnknownCluster { requested: String, served: Vec<String> },
    DuplicateClientId(String),
    NotConnected(String),
    InvalidSubject(String),
    BrokerStopped,
}

impl Display for BusError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::NoRuntime => write!(f, "the broker must be started inside a tokio runtime"),
            Self::NoClusters => write!(f, "a broker must serve at least one cluster"),
            Self::UnknownCluster { requested, served } => write!(
                f,
                "unknown cluster `{requested}`; broker serves `{}`",
                served.join("`, `")
            ),
            Self::DuplicateClientId(id) => write!(f, "client id already registered: {id}"),
            Self::NotConnected(id) => write!(f, "client is not connected: {id}"),
            Self::InvalidSubject(subject) => write!(f, "invalid subject `{subject}`"),
            Self::BrokerStopped => write!(f, "broker is no longer running"),
        }
    }
}

impl Error for BusError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for BusError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

/// Connection settings resolved from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusSettings {
    pub cluster_id: String,
}

impl BusSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(crate::config::process_env)
    }

    /// # Errors
    /// - `MissingEnv(NATS_CLUSTER_ID)` when the variable is absent or blank.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        match lookup(CLUSTER_ID_ENV)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
        {
            Some(cluster_id) => Ok(Self { cluster_id }),
            None => Err(ConfigError::MissingEnv(CLUSTER_ID_ENV)),
        }
    }
}

/// One delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub subject: String,
    pub sequence: u64,
    pub payload: Vec<u8>,
}

enum Command {
    Connect {
        cluster_id: String,
        client_id: String,
        reply: oneshot::Sender<BusResult<()>>,
    },
    Publish {
        cluster_id: String,
        client_id: String,
        subject: String,
        payload: Vec<u8>,
        reply: oneshot::Sender<BusResult<u64>>,
    },
    Subscribe {
        cluster_id: String,
        client_id: String,
        subject: String,
        reply: oneshot::Sender<BusResult<broadcast::Receiver<BusMessage>>>,
    },
    Close {
        cluster_id: String,
        client_id: String,
        reply: Option<oneshot::Sender<BusResult<()>>>,
    },
    Clients {
        cluster_id: String,
        reply: oneshot::Sender<BusResult<Vec<String>>>,
    },
}

/// Handle to an in-process broker task.
#[derive(Debug, Clone)]
pub struct LocalBroker {
    clusters: Vec<String>,
    commands: mpsc::UnboundedSender<Command>,
}

impl LocalBroker {
    /// Spawns a broker serving a single cluster on the current tokio runtime.
    pub fn start(cluster_id: impl Into<String>) -> BusResult<Self> {
        Self::serve([cluster_id.into()])
    }

    /// Spawns a broker serving every cluster in `clusters`.
    ///
    /// Client ids and subject sequences are scoped to their cluster.
    ///
    /// # Errors
    /// - `NoClusters` when `clusters` is empty.
    /// - `NoRuntime` outside a tokio runtime.
    pub fn serve<I, S>(clusters: I) -> BusResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut served: Vec<String> = Vec::new();
        for cluster_id in clusters {
            let cluster_id = cluster_id.into();
            if !served.contains(&cluster_id) {
                served.push(cluster_id);
            }
        }
        if served.is_empty() {
            return Err(BusError::NoClusters);
        }

        let handle = Handle::try_current().map_err(|_| BusError::NoRuntime)?;
        let (commands, receiver) = mpsc::unbounded_channel();
        handle.spawn(run_broker(BrokerState::new(&served), receiver));
        debug!(
            "event=bus_broker_start module=bus status=ok clusters={}",
            served.join(",")
        );

        Ok(Self {
            clusters: served,
            commands,
        })
    }

    /// Clusters served by this broker, in registration order.
    pub fn clusters(&self) -> &[String] {
        &self.clusters
    }

    pub fn serves(&self, cluster_id: &str) -> bool {
        self.clusters.iter().any(|served| served == cluster_id)
    }

    /// Registers `client_id` on `cluster_id` and returns its connection.
    pub async fn connect(&self, cluster_id: &str, client_id: &str) -> BusResult<BusConnection> {
        request(&self.commands, |reply| Command::Connect {
            cluster_id: cluster_id.to_string(),
            client_id: client_id.to_string(),
            reply,
        })
        .await?;

        Ok(BusConnection {
            cluster_id: cluster_id.to_string(),
            client_id: client_id.to_string(),
            commands: self.commands.clone(),
            closed: false,
        })
    }

    /// Client ids currently registered on `cluster_id`, sorted.
    pub async fn connected_clients(&self, cluster_id: &str) -> BusResult<Vec<String>> {
        request(&self.commands, |reply| Command::Clients {
            cluster_id: cluster_id.to_string(),
            reply,
        })
        .await
    }
}

/// Registered client connection.
#[derive(Debug)]
pub struct BusConnection {
    cluster_id: String,
    client_id: String,
    commands: mpsc::UnboundedSender<Command>,
    closed: bool,
}

impl BusConnection {
    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Publishes `payload` and returns its per-subject sequence number.
    pub async fn publish(&self, subject: &str, payload: impl Into<Vec<u8>>) -> BusResult<u64> {
        validate_subject(subject)?;
        let payload = payload.into();
        request(&self.commands, |reply| Command::Publish {
            cluster_id: self.cluster_id.clone(),
            client_id: self.client_id.clone(),
            subject: subject.to_string(),
            payload,
            reply,
        })
        .await
    }

    pub async fn subscribe(&self, subject: &str) -> BusResult<Subscription> {
        validate_subject(subject)?;
        let receiver = request(&self.commands, |reply| Command::Subscribe {
            cluster_id: self.cluster_id.clone(),
            client_id: self.client_id.clone(),
            subject: subject.to_string(),
            reply,
        })
        .await?;

        Ok(Subscription {
            subject: subject.to_string(),
            receiver,
        })
    }

    /// Deregisters the client and waits for the broker to confirm.
    pub async fn close(mut self) -> BusResult<()> {
        self.closed = true;
        request(&self.commands, |reply| Command::Close {
            cluster_id: self.cluster_id.clone(),
            client_id: self.client_id.clone(),
            reply: Some(reply),
        })
        .await
    }
}

impl Drop for BusConnection {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // Fire-and-forget: the broker may already be gone.
        let _ = self.commands.send(Command::Close {
            cluster_id: self.cluster_id.clone(),
            client_id: self.client_id.clone(),
            reply: None,
        });
    }
}

/// Stream of messages for one subject.
#[derive(Debug)]
pub struct Subscription {
    subject: String,
    receiver: broadcast::Receiver<BusMessage>,
}

impl Subscription {
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Waits for the next message; `None` once the broker has stopped.
    pub async fn next(&mut self) -> Option<BusMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "event=bus_subscription_lagged module=bus status=error subject={} skipped={}",
                        self.subject, skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

async fn request<T>(
    commands: &mpsc::UnboundedSender<Command>,
    build: impl FnOnce(oneshot::Sender<BusResult<T>>) -> Command,
) -> BusResult<T> {
    let (reply, response) = oneshot::channel();
    commands
        .send(build(reply))
        .map_err(|_| BusError::BrokerStopped)?;
    response.await.map_err(|_| BusError::BrokerStopped)?
}

fn validate_subject(subject: &str) -> BusResult<()> {
    if subject.is_empty() || subject.chars().any(char::is_whitespace) {
        return Err(BusError::InvalidSubject(subject.to_string()));
    }
    Ok(())
}

struct Channel {
    sender: broadcast::Sender<BusMessage>,
    last_sequence: u64,
}

#[derive(Default)]
struct Cluster {
    clients: HashSet<String>,
    channels: HashMap<String, Channel>,
}

impl Cluster {
    fn channel(&mut self, subject: &str) -> &mut Channel {
        self.channels
            .entry(subject.to_string())
            .or_insert_with(|| Channel {
                sender: broadcast::channel(SUBJECT_BUFFER).0,
                last_sequence: 0,
            })
    }

    fn ensure_connected(&self, client_id: &str) -> BusResult<()> {
        if self.clients.contains(client_id) {
            Ok(())
        } else {
            Err(BusError::NotConnected(client_id.to_string()))
        }
    }
}

struct BrokerState {
    order: Vec<String>,
    clusters: HashMap<String, Cluster>,
}

impl BrokerState {
    fn new(served: &[String]) -> Self {
        Self {
            order: served.to_vec(),
            clusters: served
                .iter()
                .map(|cluster_id| (cluster_id.clone(), Cluster::default()))
                .collect(),
        }
    }

    fn cluster(&mut self, cluster_id: &str) -> BusResult<&mut Cluster> {
        let order = &self.order;
        self.clusters
            .get_mut(cluster_id)
            .ok_or_else(|| BusError::UnknownCluster {
                requested: cluster_id.to_string(),
                served: order.clone(),
            })
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Connect {
                cluster_id,
                client_id,
                reply,
            } => {
                let result = self.cluster(&cluster_id).and_then(|cluster| {
                    if !cluster.clients.insert(client_id.clone()) {
                        return Err(BusError::DuplicateClientId(client_id));
                    }
                    debug!("event=bus_connect module=bus status=ok client={client_id}");
                    Ok(())
                });
                let _ = reply.send(result);
            }
            Command::Publish {
                cluster_id,
                client_id,
                subject,
                payload,
                reply,
            } => {
                let result = self.cluster(&cluster_id).and_then(|cluster| {
                    cluster.ensure_connected(&client_id)?;
                    let channel = cluster.channel(&subject);
                    channel.last_sequence += 1;
                    let sequence = channel.last_sequence;
                    // No receivers is not an error: the message is simply not delivered.
                    let _ = channel.sender.send(BusMessage {
                        subject,
                        sequence,
                        payload,
                    });
                    Ok(sequence)
                });
                let _ = reply.send(result);
            }
            Command::Subscribe {
                cluster_id,
                client_id,
                subject,
                reply,
            } => {
                let result = self.cluster(&cluster_id).and_then(|cluster| {
                    cluster.ensure_connected(&client_id)?;
                    Ok(cluster.channel(&subject).sender.subscribe())
                });
                let _ = reply.send(result);
            }
            Command::Close {
                cluster_id,
                client_id,
                reply,
            } => {
                let result = self.cluster(&cluster_id).and_then(|cluster| {
                    if cluster.clients.remove(&client_id) {
                        debug!("event=bus_close module=bus status=ok client={client_id}");
                        Ok(())
                    } else {
                        Err(BusError::NotConnected(client_id))
                    }
                });
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Command::Clients { cluster_id, reply } => {
                let result = self.cluster(&cluster_id).map(|cluster| {
                    let mut clients: Vec<String> = cluster.clients.iter().cloned().collect();
                    clients.sort();
                    clients
                });
                let _ = reply.send(result);
            }
        }
    }
}

async fn run_broker(mut state: BrokerState, mut commands: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        state.handle(command);
    }
    debug!(
        "event=bus_broker_stop module=bus status=ok clusters={}",
        state.order.join(",")
    );
}
