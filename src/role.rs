//! Custody roles and the ordered route a shipment travels
use super::error::ConfigError;
use minicbor::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    minicbor::Encode,
    minicbor::Decode,
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
pub enum Role {
    #[n(0)]
    Supplier,
    #[n(1)]
    Distributor,
    #[n(2)]
    Retailer,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Supplier, Role::Distributor, Role::Retailer];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Supplier => "Supplier",
            Role::Distributor => "Distributor",
            Role::Retailer => "Retailer",
        };
        write!(f, "{s}")
    }
}

/// The fixed order custody moves through for a shipment.
///
/// Always starts at [`Role::Supplier`], holds at least two roles and is
/// strictly increasing, so every role has at most one successor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Role>", into = "Vec<Role>")]
pub struct RoleSequence(Vec<Role>);

impl RoleSequence {
    pub fn new(roles: Vec<Role>) -> Result<Self, ConfigError> {
        if roles.len() < 2 {
            return Err(ConfigError::RouteTooShort(roles.len()));
        }
        if roles[0] != Role::Supplier {
            return Err(ConfigError::RouteStart(roles[0]));
        }
        for pair in roles.windows(2) {
            if pair[1] <= pair[0] {
                return Err(ConfigError::RouteOrder(pair[1], pair[0]));
            }
        }
        Ok(Self(roles))
    }

    /// Supplier → Distributor, the route of the two-party fixture.
    pub fn two_party() -> Self {
        Self(vec![Role::Supplier, Role::Distributor])
    }

    pub fn first(&self) -> Role {
        self.0[0]
    }

    pub fn last(&self) -> Role {
        self.0[self.0.len() - 1]
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    /// The only role custody may move to from `role`. `None` for the last
    /// role and for roles outside the route.
    pub fn successor(&self, role: Role) -> Option<Role> {
        let idx = self.0.iter().position(|r| *r == role)?;
        self.0.get(idx + 1).copied()
    }

    /// The role custody arrives from when it reaches `role`.
    pub fn predecessor(&self, role: Role) -> Option<Role> {
        let idx = self.0.iter().position(|r| *r == role)?;
        idx.checked_sub(1).map(|i| self.0[i])
    }

    pub fn is_last(&self, role: Role) -> bool {
        self.last() == role
    }

    pub fn roles(&self) -> &[Role] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// Supplier → Distributor → Retailer
impl Default for RoleSequence {
    fn default() -> Self {
        Self(Role::ALL.to_vec())
    }
}

impl TryFrom<Vec<Role>> for RoleSequence {
    type Error = ConfigError;

    fn try_from(value: Vec<Role>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoleSequence> for Vec<Role> {
    fn from(value: RoleSequence) -> Self {
        value.0
    }
}

impl fmt::Display for RoleSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, role) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{role}")?;
        }
        Ok(())
    }
}

impl<C> Encode<C> for RoleSequence {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        self.0.encode(e, ctx)
    }
}

impl<'b, C> Decode<'b, C> for RoleSequence {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        let roles: Vec<Role> = Vec::decode(d, ctx)?;

        RoleSequence::new(roles)
            .map_err(|_| minicbor::decode::Error::message("stored role sequence is malformed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_route_successors() {
        let route = RoleSequence::default();

        assert_eq!(route.successor(Role::Supplier), Some(Role::Distributor));
        assert_eq!(route.successor(Role::Distributor), Some(Role::Retailer));
        assert_eq!(route.successor(Role::Retailer), None);
        assert!(route.is_last(Role::Retailer));
        assert_eq!(route.predecessor(Role::Supplier), None);
    }

    #[test]
    fn two_party_route_ends_at_distributor() {
        let route = RoleSequence::two_party();

        assert_eq!(route.successor(Role::Distributor), None);
        assert!(route.is_last(Role::Distributor));
        assert!(!route.contains(Role::Retailer));
        assert_eq!(route.successor(Role::Retailer), None);
    }

    #[test]
    fn skipping_route_is_allowed_when_ordered() {
        let route = RoleSequence::new(vec![Role::Supplier, Role::Retailer]).unwrap();

        assert_eq!(route.successor(Role::Supplier), Some(Role::Retailer));
        assert_eq!(route.predecessor(Role::Retailer), Some(Role::Supplier));
    }

    #[test]
    fn rejects_malformed_routes() {
        assert!(matches!(
            RoleSequence::new(vec![Role::Supplier]),
            Err(ConfigError::RouteTooShort(1))
        ));
        assert!(matches!(
            RoleSequence::new(vec![Role::Distributor, Role::Retailer]),
            Err(ConfigError::RouteStart(Role::Distributor))
        ));
        assert!(matches!(
            RoleSequence::new(vec![Role::Supplier, Role::Retailer, Role::Distributor]),
            Err(ConfigError::RouteOrder(Role::Distributor, Role::Retailer))
        ));
        assert!(RoleSequence::new(vec![Role::Supplier, Role::Supplier]).is_err());
    }

    #[test]
    fn route_encoding() {
        let original = RoleSequence::default();

        let encoding = minicbor::to_vec(&original).unwrap();
        let decode: RoleSequence = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn display_joins_roles() {
        assert_eq!(
            RoleSequence::default().to_string(),
            "Supplier -> Distributor -> Retailer"
        );
    }
}
