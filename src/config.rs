use crate::domain::{AccountId, Fixed, ProductId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Product setup: identity, privileged accounts, and economic parameters.
#[derive(Debug, Clone)]
pub struct Config {
    pub product_id: ProductId,
    pub owner: AccountId,
    pub collateral: AccountId,
    pub params: ProductParams,
}

/// Per-product economic parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductParams {
    /// Fee rate on maker notional opened or closed.
    pub maker_fee: Fixed,
    /// Fee rate on taker notional opened or closed.
    pub taker_fee: Fixed,
    /// Share of funding withheld by the protocol.
    pub funding_fee: Fixed,
    /// Collateral required per unit of notional.
    pub maintenance_ratio: Fixed,
    /// Cap on aggregate maker exposure.
    pub maker_limit: Fixed,
    pub funding_fee_policy: FundingFeePolicy,
    /// Whether the gross amount opened in the unsettled version counts toward the next
    /// maintenance requirement even if it is closed again in that version.
    pub flash_maintenance: bool,
}

impl Default for ProductParams {
    fn default() -> Self {
        Self {
            maker_fee: Fixed::ZERO,
            taker_fee: Fixed::ZERO,
            funding_fee: Fixed::ZERO,
            maintenance_ratio: Fixed::new(rust_decimal::Decimal::new(1, 1)),
            maker_limit: Fixed::from_int(1_000_000),
            funding_fee_policy: FundingFeePolicy::Max,
            flash_maintenance: false,
        }
    }
}

impl ProductParams {
    /// Funding fee in force once the protocol minimum is taken into account.
    pub fn effective_funding_fee(&self, protocol_minimum: Fixed) -> Fixed {
        self.funding_fee_policy
            .resolve(self.funding_fee, protocol_minimum)
    }
}

/// How the product funding fee and the protocol minimum combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FundingFeePolicy {
    /// The larger of the two.
    #[default]
    Max,
    /// Product fee only.
    Product,
    /// Protocol minimum only.
    Protocol,
}

impl FundingFeePolicy {
    pub fn resolve(&self, product_fee: Fixed, protocol_minimum: Fixed) -> Fixed {
        match self {
            FundingFeePolicy::Max => product_fee.max(protocol_minimum),
            FundingFeePolicy::Product => product_fee,
            FundingFeePolicy::Protocol => protocol_minimum,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn new(product_id: ProductId, owner: AccountId, collateral: AccountId) -> Self {
        Self {
            product_id,
            owner,
            collateral,
            params: ProductParams::default(),
        }
    }

    pub fn with_params(mut self, params: ProductParams) -> Self {
        self.params = params;
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let product_id = required(&env_map, "PRODUCT_ID").map(ProductId::new)?;
        let owner = required(&env_map, "PRODUCT_OWNER").map(AccountId::new)?;
        let collateral = required(&env_map, "COLLATERAL_ACCOUNT").map(AccountId::new)?;

        let defaults = ProductParams::default();
        let maker_fee = fraction(&env_map, "MAKER_FEE", defaults.maker_fee)?;
        let taker_fee = fraction(&env_map, "TAKER_FEE", defaults.taker_fee)?;
        let funding_fee = fraction(&env_map, "FUNDING_FEE", defaults.funding_fee)?;
        let maintenance_ratio =
            non_negative(&env_map, "MAINTENANCE_RATIO", defaults.maintenance_ratio)?;
        let maker_limit = non_negative(&env_map, "MAKER_LIMIT", defaults.maker_limit)?;

        let funding_fee_policy = match env_map
            .get("FUNDING_FEE_POLICY")
            .map(|s| s.as_str())
            .unwrap_or("max")
        {
            "max" => FundingFeePolicy::Max,
            "product" => FundingFeePolicy::Product,
            "protocol" => FundingFeePolicy::Protocol,
            other => {
                return Err(ConfigError::InvalidValue(
                    "FUNDING_FEE_POLICY".to_string(),
                    format!("must be max, product, or protocol, got {}", other),
                ))
            }
        };

        let flash_maintenance = env_map
            .get("FLASH_MAINTENANCE")
            .map(|s| s.as_str())
            .unwrap_or("false")
            .parse::<bool>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "FLASH_MAINTENANCE".to_string(),
                    "must be true or false".to_string(),
                )
            })?;

        Ok(Config {
            product_id,
            owner,
            collateral,
            params: ProductParams {
                maker_fee,
                taker_fee,
                funding_fee,
                maintenance_ratio,
                maker_limit,
                funding_fee_policy,
                flash_maintenance,
            },
        })
    }
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn non_negative(
    env_map: &HashMap<String, String>,
    key: &str,
    default: Fixed,
) -> Result<Fixed, ConfigError> {
    let Some(raw) = env_map.get(key) else {
        return Ok(default);
    };
    let value = Fixed::from_str_canonical(raw.trim()).map_err(|_| {
        ConfigError::InvalidValue(key.to_string(), "must be a decimal number".to_string())
    })?;
    if value.is_negative() {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must not be negative".to_string(),
        ));
    }
    Ok(value)
}

fn fraction(
    env_map: &HashMap<String, String>,
    key: &str,
    default: Fixed,
) -> Result<Fixed, ConfigError> {
    let value = non_negative(env_map, key, default)?;
    if value > Fixed::ONE {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be at most 1".to_string(),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("PRODUCT_ID".to_string(), "ETH-PERP".to_string());
        map.insert("PRODUCT_OWNER".to_string(), "owner".to_string());
        map.insert("COLLATERAL_ACCOUNT".to_string(), "collateral".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.product_id, ProductId::new("ETH-PERP"));
        assert_eq!(config.params, ProductParams::default());
        assert_eq!(
            config.params.maintenance_ratio,
            Fixed::from_str_canonical("0.1").unwrap()
        );
        assert!(!config.params.flash_maintenance);
    }

    #[test]
    fn test_missing_product_id() {
        let mut env_map = setup_required_env();
        env_map.remove("PRODUCT_ID");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "PRODUCT_ID"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_missing_collateral_account() {
        let mut env_map = setup_required_env();
        env_map.insert("COLLATERAL_ACCOUNT".to_string(), "  ".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "COLLATERAL_ACCOUNT"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_parses_params() {
        let mut env_map = setup_required_env();
        env_map.insert("MAKER_FEE".to_string(), "0.001".to_string());
        env_map.insert("TAKER_FEE".to_string(), "0.002".to_string());
        env_map.insert("FUNDING_FEE".to_string(), "0.1".to_string());
        env_map.insert("MAKER_LIMIT".to_string(), "500".to_string());
        env_map.insert("FUNDING_FEE_POLICY".to_string(), "product".to_string());
        env_map.insert("FLASH_MAINTENANCE".to_string(), "true".to_string());
        let params = Config::from_env_map(env_map).unwrap().params;
        assert_eq!(params.maker_fee, Fixed::from_str_canonical("0.001").unwrap());
        assert_eq!(params.taker_fee, Fixed::from_str_canonical("0.002").unwrap());
        assert_eq!(params.maker_limit, Fixed::from_int(500));
        assert_eq!(params.funding_fee_policy, FundingFeePolicy::Product);
        assert!(params.flash_maintenance);
    }

    #[test]
    fn test_invalid_fee() {
        let mut env_map = setup_required_env();
        env_map.insert("TAKER_FEE".to_string(), "1.5".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "TAKER_FEE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_negative_maker_limit() {
        let mut env_map = setup_required_env();
        env_map.insert("MAKER_LIMIT".to_string(), "-1".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "MAKER_LIMIT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_funding_fee_policy() {
        let mut env_map = setup_required_env();
        env_map.insert("FUNDING_FEE_POLICY".to_string(), "min".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "FUNDING_FEE_POLICY"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_funding_fee_policy_resolve() {
        let product = Fixed::from_str_canonical("0.05").unwrap();
        let protocol = Fixed::from_str_canonical("0.1").unwrap();
        assert_eq!(FundingFeePolicy::Max.resolve(product, protocol), protocol);
        assert_eq!(FundingFeePolicy::Product.resolve(product, protocol), product);
        assert_eq!(FundingFeePolicy::Protocol.resolve(product, protocol), protocol);
    }
}
