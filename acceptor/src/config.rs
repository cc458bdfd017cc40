use krime_acceptor::constants::DEFAULT_MAX_CLOCK_SKEW;
use krime_acceptor::error::KrbError;
use krime_acceptor::keytab::{self, Keytab};
use krime_acceptor::proto::{
    AcceptorSettings, ApReqValidator, KeyUsage, PrincipalName, ReplayCache,
};
use serde::Deserialize;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

fn default_max_clock_skew() -> u64 {
    DEFAULT_MAX_CLOCK_SKEW.as_secs()
}

fn default_purge_interval() -> u64 {
    60
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub address: String,
    /// Defaults to DEFKTNAME, then FILE:/etc/krb5.keytab.
    pub keytab: Option<String>,
    /// When set, only tickets for this service are accepted.
    pub service: Option<String>,
    pub realm: Option<String>,
    #[serde(default = "default_max_clock_skew")]
    pub max_clock_skew: u64,
    /// Seconds. Defaults to the maximum clock skew.
    pub replay_retention: Option<u64>,
    #[serde(default)]
    pub enforce_client_address: bool,
    #[serde(default = "default_purge_interval")]
    pub purge_interval: u64,
}

impl Config {
    pub fn parse<P: AsRef<Path>>(path: P) -> io::Result<Config> {
        let mut contents = String::new();
        let mut f = fs::File::open(&path)?;
        f.read_to_string(&mut contents)?;

        toml::from_str(&contents).map_err(|err| {
            error!(?err);
            io::Error::other("toml parse failure")
        })
    }

    pub fn settings(&self) -> AcceptorSettings {
        AcceptorSettings {
            maximum_clock_skew: Duration::from_secs(self.max_clock_skew),
            enforce_client_address: self.enforce_client_address,
            authenticator_key_usage: KeyUsage::ApReqAuthenticator,
        }
    }

    pub fn expected_service(&self) -> Result<Option<(PrincipalName, String)>, KrbError> {
        match (&self.service, &self.realm) {
            (Some(service), Some(realm)) => Ok(Some((service.parse()?, realm.clone()))),
            (None, _) => Ok(None),
            (Some(_), None) => {
                error!("a service was configured without a realm");
                Err(KrbError::PrincipalNameInvalidComponents)
            }
        }
    }
}

#[derive(Debug)]
pub struct ServerState {
    pub validator: ApReqValidator,
    pub replay_cache: Arc<ReplayCache>,
    pub keytab: Keytab,
    pub expected_service: Option<(PrincipalName, String)>,
}

impl ServerState {
    pub fn expected_service(&self) -> Option<(&PrincipalName, &str)> {
        self.expected_service
            .as_ref()
            .map(|(service, realm)| (service, realm.as_str()))
    }
}

impl TryFrom<&Config> for ServerState {
    type Error = KrbError;

    fn try_from(cfg: &Config) -> Result<Self, Self::Error> {
        let settings = cfg.settings();
        let expected_service = cfg.expected_service()?;

        let keytab = keytab::load(cfg.keytab.as_deref())?;
        info!(entries = keytab.len(), "keytab loaded");

        let retention = cfg
            .replay_retention
            .map(Duration::from_secs)
            .unwrap_or(settings.maximum_clock_skew);
        let replay_cache = Arc::new(ReplayCache::new(retention, settings.maximum_clock_skew));

        let validator = ApReqValidator::new(settings, replay_cache.clone());

        Ok(ServerState {
            validator,
            replay_cache,
            keytab,
            expected_service,
        })
    }
}

#[derive(Clone, Debug)]
pub enum CoreAction {
    Shutdown,
}

#[derive(Clone, Debug)]
pub enum TaskName {
    AcceptorTcp,
    ReplayPurge,
}

impl Display for TaskName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                TaskName::AcceptorTcp => "AP-REQ Acceptor (TCP)",
                TaskName::ReplayPurge => "Replay Cache Purge",
            }
        )
    }
}
