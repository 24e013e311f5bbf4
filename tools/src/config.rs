//! Localnet configuration.
use anyhow::Context as _;
use rand::Rng;
use sba_consensus_bft::{
    testonly::{Behavior, Network, Node},
    Timeouts,
};
use sba_consensus_crypto::{Text, TextFmt};
use sba_consensus_roles::provisioner::{Extraction, Provisioners, SecretKey, Seed, Step};
use serde::{Deserialize, Serialize};
use std::{fs, net::SocketAddr, path::Path, sync::Arc, time::Duration};

/// Decodes a json value, rejecting trailing input.
pub fn decode_json<T: serde::de::DeserializeOwned>(json: &str) -> anyhow::Result<T> {
    let mut d = serde_json::Deserializer::from_str(json);
    let p = T::deserialize(&mut d)?;
    d.end()?;
    Ok(p)
}

/// Encodes a value as pretty-printed json.
pub fn encode_json<T: Serialize>(x: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(x)?)
}

/// How a simulated provisioner behaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorConfig {
    /// Proposes and votes.
    #[default]
    Honest,
    /// Votes, but never proposes.
    NotProposing,
    /// Nothing it sends reaches the others.
    Offline,
}

impl From<BehaviorConfig> for Behavior {
    fn from(b: BehaviorConfig) -> Self {
        match b {
            BehaviorConfig::Honest => Self::Honest,
            BehaviorConfig::NotProposing => Self::HonestNotProposing,
            BehaviorConfig::Offline => Self::Offline,
        }
    }
}

/// A simulated provisioner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisionerConfig {
    /// Secret key in text format (`provisioner:secret:bls12_381:<hex>`).
    pub secret_key: String,
    /// Stake, has to be positive.
    pub stake: u64,
    /// Behavior of the node.
    #[serde(default)]
    pub behavior: BehaviorConfig,
}

/// Phase timeouts in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutsConfig {
    /// Base timeout of the generation phase.
    pub generation_ms: u64,
    /// Base timeout of both reduction phases.
    pub reduction_ms: u64,
    /// Base timeout of the agreement phase.
    pub agreement_ms: u64,
    /// Cap of every timeout.
    pub max_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        let t = Timeouts::default();
        let ms = |d: Duration| d.as_millis() as u64;
        Self {
            generation_ms: ms(t.generation),
            reduction_ms: ms(t.reduction),
            agreement_ms: ms(t.agreement),
            max_ms: ms(t.max),
        }
    }
}

impl TimeoutsConfig {
    fn build(&self) -> anyhow::Result<Timeouts> {
        let t = Timeouts {
            generation: Duration::from_millis(self.generation_ms),
            reduction: Duration::from_millis(self.reduction_ms),
            agreement: Duration::from_millis(self.agreement_ms),
            max: Duration::from_millis(self.max_ms),
        };
        t.validate()?;
        Ok(t)
    }
}

fn default_max_step() -> u8 {
    u8::MAX
}

/// Configuration of a local network of simulated provisioners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Provisioners of the network.
    pub provisioners: Vec<ProvisionerConfig>,
    /// Committee seats per step.
    pub committee_size: usize,
    /// Phase timeouts.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    /// Last step of a round.
    #[serde(default = "default_max_step")]
    pub max_step: u8,
    /// Rounds to finalize before exiting.
    #[serde(default)]
    pub rounds: Option<usize>,
    /// IP:port to serve metrics data for scraping.
    #[serde(default)]
    pub metrics_server_addr: Option<SocketAddr>,
}

impl AppConfig {
    /// Config of `n` honest provisioners with fresh keys and equal stakes.
    pub fn generate(rng: &mut impl Rng, n: usize) -> Self {
        Self {
            provisioners: (0..n)
                .map(|_| ProvisionerConfig {
                    secret_key: rng.gen::<SecretKey>().encode(),
                    stake: 1,
                    behavior: BehaviorConfig::Honest,
                })
                .collect(),
            committee_size: 64,
            timeouts: TimeoutsConfig::default(),
            max_step: default_max_step(),
            rounds: None,
            metrics_server_addr: None,
        }
    }

    /// Reads and validates the config at `path`.
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let json = fs::read_to_string(path).with_context(|| path.display().to_string())?;
        let cfg: Self = decode_json(&json).context("decode_json()")?;
        cfg.network().context("invalid config")?;
        Ok(cfg)
    }

    /// Builds the network described by this config.
    pub fn network(&self) -> anyhow::Result<Network> {
        anyhow::ensure!(self.committee_size > 0, "committee_size has to be positive");
        let mut nodes = vec![];
        let mut stakes = vec![];
        for (i, p) in self.provisioners.iter().enumerate() {
            let key: SecretKey = Text::new(&p.secret_key)
                .decode()
                .with_context(|| format!("provisioners[{i}].secret_key"))?;
            stakes.push((key.public(), p.stake));
            nodes.push(Node::new(key, p.behavior.into()));
        }
        let provisioners = Provisioners::new(stakes).context("provisioners")?;
        Ok(Network {
            nodes,
            provisioners: Arc::new(provisioners),
            sortition: Arc::new(Extraction),
            committee_size: self.committee_size,
            timeouts: self.timeouts.build().context("timeouts")?,
            max_step: Step(self.max_step),
            seed: Seed([0; 32]),
        })
    }
}
