//! Scoped-delegation capability model
//!
//! A capability is a secondary keypair granted a time-boxed, allow-listed
//! subset of a smart account's authority. The scope is immutable after
//! issuance; the only ways authority ends are expiry or revocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::Address;
use crate::ledger::CallStep;

/// ERC20-style approval: approve(spender, amount)
pub const SEL_APPROVE: &str = "approve";
/// Pool swap entry points: buyGold(amount) / sellGold(amount)
pub const SEL_BUY_GOLD: &str = "buyGold";
pub const SEL_SELL_GOLD: &str = "sellGold";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityStatus {
    Active,
    Expired,
    Revoked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgOperator {
    /// Argument must match the pinned value exactly
    Equal,
    /// Any value accepted at this position
    Any,
}

/// Constraint on a single call argument position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgConstraint {
    pub position: usize,
    pub operator: ArgOperator,
    pub value: Option<String>,
}

impl ArgConstraint {
    pub fn equal(position: usize, value: impl Into<String>) -> Self {
        Self {
            position,
            operator: ArgOperator::Equal,
            value: Some(value.into()),
        }
    }

    pub fn any(position: usize) -> Self {
        Self {
            position,
            operator: ArgOperator::Any,
            value: None,
        }
    }

    fn matches(&self, args: &[String]) -> bool {
        match self.operator {
            ArgOperator::Any => true,
            ArgOperator::Equal => args.get(self.position) == self.value.as_ref(),
        }
    }
}

/// A single allow-list entry: (target contract, function, argument
/// constraints). Permissions are evaluated independently; holding one
/// never implies another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub target_contract: Address,
    pub function_selector: String,
    pub arg_constraints: Vec<ArgConstraint>,
}

impl Permission {
    pub fn matches(&self, step: &CallStep) -> bool {
        self.target_contract == step.target
            && self.function_selector == step.selector
            && self.arg_constraints.iter().all(|c| c.matches(&step.args))
    }
}

/// Ordered set of permissions forming a capability's scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityScope {
    permissions: Vec<Permission>,
}

impl CapabilityScope {
    pub fn new(permissions: Vec<Permission>) -> Self {
        Self { permissions }
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    /// A call is authorized iff some permission matches its target and
    /// selector and every EQUAL-constrained argument matches exactly.
    pub fn authorizes(&self, step: &CallStep) -> bool {
        self.permissions.iter().any(|p| p.matches(step))
    }
}

/// An issued capability: public metadata plus the scope. The matching
/// signing key lives in the capability store, never here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub session_key_id: Uuid,
    /// Hex-encoded session public key
    pub session_public_key: String,
    pub session_address: Address,
    pub owner_account: Address,
    pub scope: CapabilityScope,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: CapabilityStatus,
}

impl Capability {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Build the trading allow-list for the agent:
/// - approve() on each spend token, spender pinned to the pool address
///   (never "any spender" — this pin is the boundary that keeps the
///   delegated key from routing funds anywhere but the swap path)
/// - buyGold()/sellGold() on the pool, amount unconstrained
pub fn trading_scope(stable_token: &Address, gold_token: &Address, pool: &Address) -> CapabilityScope {
    let approve = |token: &Address| Permission {
        target_contract: token.clone(),
        function_selector: SEL_APPROVE.to_string(),
        arg_constraints: vec![
            ArgConstraint::equal(0, pool.to_string()),
            ArgConstraint::any(1),
        ],
    };

    let pool_call = |selector: &str| Permission {
        target_contract: pool.clone(),
        function_selector: selector.to_string(),
        arg_constraints: vec![ArgConstraint::any(0)],
    };

    CapabilityScope::new(vec![
        approve(stable_token),
        approve(gold_token),
        pool_call(SEL_BUY_GOLD),
        pool_call(SEL_SELL_GOLD),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        format!("0x{:040x}", n).parse().unwrap()
    }

    fn scope() -> CapabilityScope {
        trading_scope(&addr(1), &addr(2), &addr(3))
    }

    #[test]
    fn test_approve_pinned_to_pool_spender() {
        let scope = scope();

        let good = CallStep::call(addr(1), SEL_APPROVE, vec![addr(3).to_string(), "100".into()]);
        assert!(scope.authorizes(&good));

        // Any spender other than the pool is rejected
        let bad = CallStep::call(addr(1), SEL_APPROVE, vec![addr(9).to_string(), "100".into()]);
        assert!(!scope.authorizes(&bad));
    }

    #[test]
    fn test_pool_calls_accept_any_amount() {
        let scope = scope();

        assert!(scope.authorizes(&CallStep::call(addr(3), SEL_BUY_GOLD, vec!["1".into()])));
        assert!(scope.authorizes(&CallStep::call(
            addr(3),
            SEL_SELL_GOLD,
            vec![u128::MAX.to_string()]
        )));
    }

    #[test]
    fn test_unlisted_selector_rejected() {
        let scope = scope();

        // transfer() is not in the allow-list even on in-scope contracts
        let transfer = CallStep::call(addr(1), "transfer", vec![addr(9).to_string(), "100".into()]);
        assert!(!scope.authorizes(&transfer));
    }

    #[test]
    fn test_unlisted_target_rejected() {
        let scope = scope();

        // buyGold on some other contract does not inherit pool authority
        let elsewhere = CallStep::call(addr(8), SEL_BUY_GOLD, vec!["1".into()]);
        assert!(!scope.authorizes(&elsewhere));
    }

    #[test]
    fn test_equal_constraint_requires_argument_present() {
        let scope = scope();

        // approve with no arguments cannot satisfy the spender pin
        let empty = CallStep::call(addr(1), SEL_APPROVE, vec![]);
        assert!(!scope.authorizes(&empty));
    }

    #[test]
    fn test_expiry_check() {
        let now = Utc::now();
        let cap = Capability {
            session_key_id: Uuid::new_v4(),
            session_public_key: "00".into(),
            session_address: addr(4),
            owner_account: addr(5),
            scope: scope(),
            issued_at: now - chrono::Duration::hours(2),
            expires_at: now - chrono::Duration::hours(1),
            status: CapabilityStatus::Active,
        };
        assert!(cap.is_expired_at(now));
        assert!(!cap.is_expired_at(now - chrono::Duration::hours(1) - chrono::Duration::seconds(1)));
    }
}
