//! Property tests for the ledger invariants.
//!
//! These use proptest to drive random books and random operation sequences through the
//! public API and check that accrual stays zero-sum, accounts stay one-sided, settlement
//! is idempotent, and catching up in one call matches catching up step by step.

use perp_ledger::engine::{accrue, AccrualParams};
use perp_ledger::external::{MockEnv, MockOracle};
use perp_ledger::{
    AccountId, Config, Fixed, OracleVersion, Position, Product, ProductId, ProductParams,
    Timestamp, Version,
};
use proptest::prelude::*;

fn micros(n: i64) -> Fixed {
    Fixed::from_int(n)
        .try_div(Fixed::from_int(1_000_000))
        .unwrap()
}

fn accounts() -> [AccountId; 3] {
    [
        AccountId::new("alice"),
        AccountId::new("bob"),
        AccountId::new("carol"),
    ]
}

fn collateral() -> AccountId {
    AccountId::new("collateral")
}

fn config() -> Config {
    let params = ProductParams {
        funding_fee: micros(50_000),
        ..ProductParams::default()
    };
    Config::new(ProductId::new("ETH-PERP"), AccountId::new("owner"), collateral())
        .with_params(params)
}

fn oracle_version(version: u64, timestamp: u64, price: i64) -> OracleVersion {
    OracleVersion {
        version: Version::new(version),
        timestamp: Timestamp::new(timestamp),
        price: Fixed::from_int(price),
    }
}

#[derive(Debug, Clone)]
enum Op {
    OpenMaker(usize, i64),
    CloseMaker(usize, i64),
    OpenTaker(usize, i64),
    CloseTaker(usize, i64),
    CloseAll(usize),
    /// Publish a new version with this price and rate (in millionths per second).
    Advance(i64, i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..3, 1i64..50).prop_map(|(a, n)| Op::OpenMaker(a, n)),
        (0usize..3, 1i64..50).prop_map(|(a, n)| Op::CloseMaker(a, n)),
        (0usize..3, 1i64..50).prop_map(|(a, n)| Op::OpenTaker(a, n)),
        (0usize..3, 1i64..50).prop_map(|(a, n)| Op::CloseTaker(a, n)),
        (0usize..3).prop_map(Op::CloseAll),
        (-150i64..150, -100i64..100).prop_map(|(p, r)| Op::Advance(p, r)),
    ]
}

struct Harness {
    env: MockEnv,
    product: Product,
    next_version: u64,
}

impl Harness {
    fn new() -> Self {
        let env = MockEnv::new(MockOracle::new().with_version(1, 0, "100"));
        let product = Product::new(&config(), &env.oracle).unwrap();
        Self {
            env,
            product,
            next_version: 2,
        }
    }

    fn apply(&mut self, op: &Op) {
        if let Op::Advance(price, rate) = *op {
            let version = self.next_version;
            self.next_version += 1;
            self.env
                .oracle
                .push_version(version, version * 60, &price.to_string());
            self.env.oracle.set_rate(&micros(rate).to_string());
            return;
        }

        let accounts = accounts();
        let mut deps = self.env.deps();
        let product = &mut self.product;
        let _ = match *op {
            Op::OpenMaker(a, n) => product
                .open_maker(&mut deps, &accounts[a], Fixed::from_int(n))
                .map(|_| ()),
            Op::CloseMaker(a, n) => product
                .close_maker(&mut deps, &accounts[a], Fixed::from_int(n))
                .map(|_| ()),
            Op::OpenTaker(a, n) => product
                .open_taker(&mut deps, &accounts[a], Fixed::from_int(n))
                .map(|_| ()),
            Op::CloseTaker(a, n) => product
                .close_taker(&mut deps, &accounts[a], Fixed::from_int(n))
                .map(|_| ()),
            Op::CloseAll(a) => product
                .close_all(&mut deps, &collateral(), &accounts[a])
                .map(|_| ()),
            Op::Advance(..) => Ok(()),
        };
    }

    fn settle_all(&mut self) {
        for account in accounts() {
            self.product
                .settle_account(&mut self.env.deps(), &account)
                .unwrap();
        }
    }
}

proptest! {
    #[test]
    fn prop_accrual_step_is_zero_sum(
        maker in 0i64..10_000,
        taker in 0i64..10_000,
        from_price in -5_000i64..5_000,
        to_price in -5_000i64..5_000,
        elapsed in 0u64..86_400,
        rate in -1_000i64..1_000,
        fee in 0i64..1_000_000,
    ) {
        let position = Position::new(Fixed::from_int(maker), Fixed::from_int(taker));
        let step = accrue(
            &position,
            &oracle_version(1, 0, from_price),
            &oracle_version(2, elapsed, to_price),
            elapsed,
            micros(rate),
            AccrualParams { funding_fee: micros(fee), closed: false },
        )
        .unwrap();

        let total = step
            .maker_total()
            .unwrap()
            .try_add(step.taker_total().unwrap())
            .unwrap()
            .try_add(step.funding_fee)
            .unwrap();
        prop_assert_eq!(total, Fixed::ZERO);

        // Only the matched notional moves with the price.
        let matched = Fixed::from_int(maker.min(taker));
        let expected = Fixed::from_int(to_price - from_price).try_mul(matched).unwrap();
        prop_assert_eq!(step.pnl.taker, expected);
        prop_assert!(!step.funding_fee.is_negative());
    }
}

proptest! {
    #[test]
    fn prop_accounts_stay_one_sided(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut harness = Harness::new();
        for op in &ops {
            harness.apply(op);
            if matches!(op, Op::Advance(..)) {
                harness.settle_all();
            }
            for account in accounts() {
                prop_assert!(!harness.product.position(&account).is_double_sided());
                let next = harness.product.pre(&account);
                let projected = harness.product.position(&account).next(&next).unwrap();
                prop_assert!(!projected.is_double_sided());
            }
        }
    }
}

proptest! {
    #[test]
    fn prop_versions_are_monotonic(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut harness = Harness::new();
        let mut seen = accounts().map(|a| harness.product.latest_version_of(&a));
        for op in &ops {
            harness.apply(op);
            for (i, account) in accounts().iter().enumerate() {
                let latest = harness.product.latest_version_of(account);
                prop_assert!(latest >= seen[i]);
                prop_assert!(latest <= harness.product.latest_version());
                seen[i] = latest;
            }
        }
    }
}

proptest! {
    #[test]
    fn prop_settle_twice_is_noop(ops in prop::collection::vec(op_strategy(), 1..30)) {
        let mut harness = Harness::new();
        for op in &ops {
            harness.apply(op);
        }
        harness.product.settle(&mut harness.env.deps()).unwrap();
        let latest = harness.product.latest_version();
        let value = harness.product.value_at_version(latest);
        let fees = harness.env.collateral.product_fees.len();
        let _ = harness.product.take_events();

        let again = harness.product.settle(&mut harness.env.deps()).unwrap();
        prop_assert!(again.is_noop());
        prop_assert_eq!(harness.product.value_at_version(latest), value);
        prop_assert_eq!(harness.env.collateral.product_fees.len(), fees);
        prop_assert!(harness.product.take_events().is_empty());
    }
}

proptest! {
    #[test]
    fn prop_value_is_conserved(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut harness = Harness::new();
        for op in &ops {
            harness.apply(op);
        }
        harness.settle_all();

        let collateral = &harness.env.collateral;
        let mut total = collateral.total_fees();
        for account in accounts() {
            total = total.try_add(collateral.total_delta(&account)).unwrap();
        }
        // Per-unit truncation can only withhold dust, never create value.
        prop_assert!(total.abs() <= micros(1).try_div(Fixed::from_int(1_000_000)).unwrap());
    }
}

proptest! {
    #[test]
    fn prop_catch_up_matches_stepwise(
        maker in 1i64..100,
        taker in 1i64..100,
        steps in prop::collection::vec((1u64..3_600, -150i64..150, -100i64..100), 1..8),
    ) {
        let build = || {
            let mut oracle = MockOracle::new().with_version(1, 0, "100");
            let mut timestamp = 0;
            for (i, (dt, price, _)) in steps.iter().enumerate() {
                timestamp += dt;
                oracle.push_version(i as u64 + 2, timestamp, &price.to_string());
            }
            oracle.set_current(1);
            let mut env = MockEnv::new(oracle);
            let mut product = Product::new(&config(), &env.oracle).unwrap();
            let [alice, bob, _] = accounts();
            product.open_maker(&mut env.deps(), &alice, Fixed::from_int(maker)).unwrap();
            product.open_taker(&mut env.deps(), &bob, Fixed::from_int(taker)).unwrap();
            (env, product)
        };
        // One constant rate keeps both runs on identical oracle inputs.
        let rate = micros(steps[0].2).to_string();
        let last = steps.len() as u64 + 1;

        let (mut stepwise_env, mut stepwise) = build();
        stepwise_env.oracle.set_rate(&rate);
        for v in 2..=last {
            stepwise_env.oracle.set_current(v);
            stepwise.settle(&mut stepwise_env.deps()).unwrap();
        }

        let (mut direct_env, mut direct) = build();
        direct_env.oracle.set_rate(&rate);
        direct_env.oracle.set_current(last);
        direct.settle(&mut direct_env.deps()).unwrap();

        let last = Version::new(last);
        prop_assert_eq!(stepwise.value_at_version(last), direct.value_at_version(last));
        prop_assert_eq!(stepwise.share_at_version(last), direct.share_at_version(last));
        prop_assert_eq!(stepwise.position_global(), direct.position_global());
        prop_assert_eq!(
            stepwise_env.collateral.total_fees(),
            direct_env.collateral.total_fees()
        );
    }
}
