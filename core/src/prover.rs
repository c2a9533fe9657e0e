//! Proof Backend
//!
//! Interface to the proving system for confidential inputs and outputs.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Output Proof                                │
//! │  Public:  generation, asset_cm, out_cm                          │
//! │  Private: asset, blinding                                       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                     Input Proof                                 │
//! │  Public:  generation, asset_cm, nullifier, anchor               │
//! │  Private: asset, blinding, root_cm, position, sibling path      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The backend is opaque to the ledger: a pure function from witness to
//! proof bytes and from (statement, proof) to a verdict.

use anyhow::{Result, bail};
use std::sync::Arc;

use shroud_config::{ProverModeToml, ProverTomlConfig};
use shroud_privacy::{Asset, AssetCommitment, Commitment, Nullifier, commit_asset};

use crate::record::Generation;

// ============================================================================
// Proof Types
// ============================================================================

/// Opaque proof bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof(pub Vec<u8>);

/// Private data for proving a new output
#[derive(Debug, Clone)]
pub struct OutputWitness {
    pub generation: Generation,
    pub asset: Asset,
    pub blinding: [u8; 32],
    pub asset_cm: AssetCommitment,
    pub out_cm: Commitment,
}

/// Private data for proving a spend
#[derive(Debug, Clone)]
pub struct InputWitness {
    pub generation: Generation,
    pub asset: Asset,
    pub blinding: [u8; 32],
    pub asset_cm: AssetCommitment,
    pub root_cm: Commitment,
    pub position: u64,
    pub siblings: Vec<[u8; 32]>,
    pub nullifier: Nullifier,
    pub anchor: [u8; 32],
}

/// Public inputs a proof is checked against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofStatement {
    Output {
        generation: Generation,
        asset_cm: AssetCommitment,
        out_cm: Commitment,
    },
    Input {
        generation: Generation,
        asset_cm: AssetCommitment,
        nullifier: Nullifier,
        anchor: [u8; 32],
    },
}

impl OutputWitness {
    pub fn statement(&self) -> ProofStatement {
        ProofStatement::Output {
            generation: self.generation,
            asset_cm: self.asset_cm,
            out_cm: self.out_cm,
        }
    }
}

impl InputWitness {
    pub fn statement(&self) -> ProofStatement {
        ProofStatement::Input {
            generation: self.generation,
            asset_cm: self.asset_cm,
            nullifier: self.nullifier,
            anchor: self.anchor,
        }
    }
}

impl ProofStatement {
    fn digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_derive_key("shroud mock proof v1");
        match self {
            ProofStatement::Output {
                generation,
                asset_cm,
                out_cm,
            } => {
                hasher.update(b"output");
                hasher.update(&[generation_tag(*generation)]);
                hasher.update(asset_cm.as_bytes());
                hasher.update(out_cm.as_bytes());
            }
            ProofStatement::Input {
                generation,
                asset_cm,
                nullifier,
                anchor,
            } => {
                hasher.update(b"input");
                hasher.update(&[generation_tag(*generation)]);
                hasher.update(asset_cm.as_bytes());
                hasher.update(nullifier.as_bytes());
                hasher.update(anchor);
            }
        }
        *hasher.finalize().as_bytes()
    }
}

fn generation_tag(generation: Generation) -> u8 {
    match generation {
        Generation::Cleartext => 0,
        Generation::V0 => 1,
        Generation::V1a => 2,
        Generation::V1b => 3,
    }
}

// ============================================================================
// Backend Trait
// ============================================================================

/// Trait for ZK proof generation
pub trait ProofBackend: Send + Sync {
    fn prove_output(&self, witness: &OutputWitness) -> Result<Proof>;

    fn prove_input(&self, witness: &InputWitness) -> Result<Proof>;

    fn verify(&self, statement: &ProofStatement, proof: &Proof) -> Result<bool>;
}

/// Backend selected by the `[prover]` section
pub fn backend_from_config(config: &ProverTomlConfig) -> Arc<dyn ProofBackend> {
    match config.mode {
        ProverModeToml::Mock => Arc::new(MockProofBackend::new()),
    }
}

// ============================================================================
// Mock Backend
// ============================================================================

/// Mock backend - proofs are a hash of the public inputs.
///
/// It still checks that the private asset opens the public commitment, so a
/// builder bug surfaces as a proving error the same way it would with a real
/// circuit.
pub struct MockProofBackend {
    /// Simulated proving time in ms
    prove_time_ms: u64,
    /// Every prove call fails with this message when set
    fail_with: Option<String>,
}

/// Mock proof is 128 bytes (32 digest + padding)
const MOCK_PROOF_LEN: usize = 128;

impl MockProofBackend {
    pub fn new() -> Self {
        Self {
            prove_time_ms: 0,
            fail_with: None,
        }
    }

    /// Create with custom proving time (for testing)
    pub fn with_prove_time(ms: u64) -> Self {
        Self {
            prove_time_ms: ms,
            fail_with: None,
        }
    }

    /// Backend whose every prove call fails
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            prove_time_ms: 0,
            fail_with: Some(reason.into()),
        }
    }

    fn simulate(&self) -> Result<()> {
        if self.prove_time_ms > 0 {
            std::thread::sleep(std::time::Duration::from_millis(self.prove_time_ms));
        }
        match &self.fail_with {
            Some(reason) => bail!("{}", reason),
            None => Ok(()),
        }
    }

    fn proof_for(statement: &ProofStatement) -> Proof {
        let mut bytes = Vec::with_capacity(MOCK_PROOF_LEN);
        bytes.extend_from_slice(&statement.digest());
        bytes.resize(MOCK_PROOF_LEN, 0);
        Proof(bytes)
    }
}

impl Default for MockProofBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ProofBackend for MockProofBackend {
    fn prove_output(&self, witness: &OutputWitness) -> Result<Proof> {
        self.simulate()?;
        if commit_asset(&witness.asset, &witness.blinding)? != witness.asset_cm {
            bail!("output asset does not open its commitment");
        }
        Ok(Self::proof_for(&witness.statement()))
    }

    fn prove_input(&self, witness: &InputWitness) -> Result<Proof> {
        self.simulate()?;
        if commit_asset(&witness.asset, &witness.blinding)? != witness.asset_cm {
            bail!("input asset does not open its commitment");
        }
        Ok(Self::proof_for(&witness.statement()))
    }

    fn verify(&self, statement: &ProofStatement, proof: &Proof) -> Result<bool> {
        Ok(proof.0.len() == MOCK_PROOF_LEN && proof.0[..32] == statement.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_privacy::currency_id;

    fn output_witness() -> OutputWitness {
        let asset = Asset::token(currency_id("SERO"), 60);
        let blinding = [3u8; 32];
        OutputWitness {
            generation: Generation::V1a,
            asset,
            blinding,
            asset_cm: commit_asset(&asset, &blinding).unwrap(),
            out_cm: Commitment([4u8; 32]),
        }
    }

    #[test]
    fn test_mock_prover() {
        let prover = MockProofBackend::new();
        let witness = output_witness();

        let proof = prover.prove_output(&witness).unwrap();
        assert_eq!(proof.0.len(), MOCK_PROOF_LEN);
        assert!(prover.verify(&witness.statement(), &proof).unwrap());
    }

    #[test]
    fn test_proof_bound_to_statement() {
        let prover = MockProofBackend::new();
        let witness = output_witness();
        let proof = prover.prove_output(&witness).unwrap();

        let mut other = witness.clone();
        other.generation = Generation::V1b;
        assert!(!prover.verify(&other.statement(), &proof).unwrap());
    }

    #[test]
    fn test_failing_backend() {
        let prover = MockProofBackend::failing("circuit unavailable");
        let err = prover.prove_output(&output_witness()).unwrap_err();
        assert_eq!(err.to_string(), "circuit unavailable");
    }

    #[test]
    fn test_backend_from_config() {
        let backend = backend_from_config(&ProverTomlConfig::default());
        let witness = output_witness();
        let proof = backend.prove_output(&witness).unwrap();
        assert!(backend.verify(&witness.statement(), &proof).unwrap());
    }

    #[test]
    fn test_wrong_opening_fails_to_prove() {
        let prover = MockProofBackend::new();
        let mut witness = output_witness();
        witness.blinding = [5u8; 32];
        assert!(prover.prove_output(&witness).is_err());
    }
}
