//! Serialization of a stored delegation into the payload the settlement
//! client transmits.

use crate::{
    error::{RedemptionError, RedemptionResult},
    model::DelegationDatum,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caveat {
    pub enforcer: String,
    pub terms: String,
    #[serde(default)]
    pub args: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedDelegation<'a> {
    delegate: &'a str,
    delegator: &'a str,
    authority: &'a str,
    caveats: Vec<Caveat>,
    salt: &'a str,
    signature: &'a str,
}

impl DelegationDatum {
    /// Build the JSON payload for execution. Fails if the stored caveats do
    /// not parse or the delegation was never signed; neither is retryable.
    pub fn to_payload(&self) -> RedemptionResult<Vec<u8>> {
        if self.signature.trim().is_empty() {
            return Err(RedemptionError::Delegation(format!(
                "delegation {} has no signature",
                self.id
            )));
        }
        let caveats: Vec<Caveat> = serde_json::from_str(&self.caveats).map_err(|e| {
            RedemptionError::Delegation(format!("delegation {} caveats: {e}", self.id))
        })?;
        let signed = SignedDelegation {
            delegate: &self.delegate,
            delegator: &self.delegator,
            authority: &self.authority,
            caveats,
            salt: &self.salt,
            signature: &self.signature,
        };
        Ok(serde_json::to_vec(&signed)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datum(caveats: &str, signature: &str) -> DelegationDatum {
        DelegationDatum {
            id: "del-1".into(),
            delegate: "0xdelegate".into(),
            delegator: "0xdelegator".into(),
            authority: "0xroot".into(),
            caveats: caveats.into(),
            salt: "0x01".into(),
            signature: signature.into(),
        }
    }

    #[test]
    fn payload_carries_parsed_caveats() {
        let d = datum(r#"[{"enforcer":"0xenf","terms":"0x00"}]"#, "0xsig");
        let bytes = d.to_payload().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["delegator"], "0xdelegator");
        assert_eq!(value["caveats"][0]["enforcer"], "0xenf");
        assert_eq!(value["caveats"][0]["args"], "");
        assert_eq!(value["signature"], "0xsig");
    }

    #[test]
    fn malformed_caveats_are_rejected() {
        let err = datum("{not json", "0xsig").to_payload().unwrap_err();
        assert!(matches!(err, RedemptionError::Delegation(_)));
    }

    #[test]
    fn unsigned_delegation_is_rejected() {
        let err = datum("[]", "  ").to_payload().unwrap_err();
        assert!(err.to_string().contains("no signature"));
    }
}
