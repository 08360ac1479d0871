//! Participant identities and the role directory the harness provisions
use super::error::LedgerError;
use super::role::Role;
use super::utils;
use anyhow::Context;
use sled::transaction::{ConflictableTransactionError, TransactionResult};
use std::fmt;
use tracing::debug;

pub const DEFAULT_HRP: &str = "party_";

/// Opaque address-like identity. Equality is the only thing the ledger
/// cares about.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Participant(String);

impl Participant {
    /// Wrap an existing token without inspecting it.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Mint a fresh uuid7 identity under the `hrp` prefix.
    pub fn generate(hrp: &str) -> anyhow::Result<Self> {
        let addr = utils::new_uuid_to_bech32(hrp)?;
        Ok(Self(addr))
    }

    /// Accept only well-formed bech32 addresses carrying a 16 byte uuid.
    pub fn parse(addr: &str) -> anyhow::Result<Self> {
        let (_, data) = bech32::decode(addr).context("address is not valid bech32")?;
        if data.len() != 16 {
            anyhow::bail!("address payload is {} bytes, expected 16", data.len());
        }
        Ok(Self(addr.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<C> minicbor::Encode<C> for Participant {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Participant {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let addr = d.str()?;

        Ok(Participant(addr.to_owned()))
    }
}

/// Durable record of which roles each participant has been provisioned for.
///
/// The harness fills this in before driving the ledger; the ledger only reads
/// it when a shipment is created.
#[derive(Clone)]
pub struct ParticipantDirectory {
    tree: sled::Tree,
    hrp: String,
}

impl ParticipantDirectory {
    pub(crate) fn new(tree: sled::Tree, hrp: String) -> Self {
        Self { tree, hrp }
    }

    /// Grant `role` to `participant`. Granting a role twice is a no-op.
    pub fn register(&self, participant: &Participant, role: Role) -> Result<(), LedgerError> {
        let key = participant.as_str().as_bytes();

        let res: TransactionResult<(), LedgerError> = self.tree.transaction(|tx| {
            let mut roles = match tx.get(key)? {
                Some(bytes) => decode_roles(&bytes).map_err(ConflictableTransactionError::Abort)?,
                None => vec![],
            };
            if !roles.contains(&role) {
                roles.push(role);
                roles.sort();
            }
            let cbor = minicbor::to_vec(&roles)
                .map_err(|e| ConflictableTransactionError::Abort(LedgerError::from(e)))?;
            tx.insert(key, cbor)?;
            Ok(())
        });
        res?;

        debug!(participant = %participant, %role, "role registered");
        Ok(())
    }

    /// Mint a new participant and grant it `role`.
    pub fn provision(&self, role: Role) -> anyhow::Result<Participant> {
        let participant = Participant::generate(&self.hrp)?;
        self.register(&participant, role)
            .with_context(|| format!("failed to register {participant} as {role}"))?;
        Ok(participant)
    }

    pub fn roles_of(&self, participant: &Participant) -> Result<Vec<Role>, LedgerError> {
        match self.tree.get(participant.as_str().as_bytes())? {
            Some(bytes) => decode_roles(&bytes),
            None => Ok(vec![]),
        }
    }

    pub fn has_role(&self, participant: &Participant, role: Role) -> Result<bool, LedgerError> {
        Ok(self.roles_of(participant)?.contains(&role))
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

fn decode_roles(bytes: &[u8]) -> Result<Vec<Role>, LedgerError> {
    Ok(minicbor::decode(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> ParticipantDirectory {
        let db = sled::Config::new().temporary(true).open().unwrap();
        ParticipantDirectory::new(db.open_tree("participants").unwrap(), DEFAULT_HRP.into())
    }

    #[test]
    fn participant_encoding() {
        let original = Participant::generate(DEFAULT_HRP).unwrap();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: Participant = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn parse_accepts_generated_addresses() {
        let generated = Participant::generate(DEFAULT_HRP).unwrap();
        let parsed = Participant::parse(generated.as_str()).unwrap();

        assert_eq!(generated, parsed);
        assert!(Participant::parse("not an address").is_err());
    }

    #[test]
    fn register_is_idempotent_and_accumulates_roles() {
        let dir = directory();
        let p = Participant::new("acct_0");

        dir.register(&p, Role::Distributor).unwrap();
        dir.register(&p, Role::Supplier).unwrap();
        dir.register(&p, Role::Distributor).unwrap();

        assert_eq!(
            dir.roles_of(&p).unwrap(),
            vec![Role::Supplier, Role::Distributor]
        );
        assert!(dir.has_role(&p, Role::Supplier).unwrap());
        assert!(!dir.has_role(&p, Role::Retailer).unwrap());
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn unknown_participant_has_no_roles() {
        let dir = directory();

        assert!(dir.roles_of(&Participant::new("ghost")).unwrap().is_empty());
        assert!(dir.is_empty());
    }

    #[test]
    fn provision_uses_configured_prefix() {
        let dir = directory();
        let p = dir.provision(Role::Retailer).unwrap();

        assert!(p.as_str().starts_with("party_1"));
        assert!(dir.has_role(&p, Role::Retailer).unwrap());
    }
}
