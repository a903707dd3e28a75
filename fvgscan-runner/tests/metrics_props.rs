//! Property tests for performance metrics.

use proptest::prelude::*;

use fvgscan_runner::metrics::{max_drawdown, profit_factor, sharpe_ratio, win_rate};

proptest! {
    #[test]
    fn drawdown_bounded_by_losses(pnls in prop::collection::vec(-500.0f64..500.0, 0..60)) {
        let dd = max_drawdown(&pnls);
        let losses: f64 = pnls.iter().filter(|&&p| p < 0.0).map(|p| -p).sum();
        prop_assert!(dd >= 0.0);
        prop_assert!(dd <= losses + 1e-9);
    }

    #[test]
    fn win_rate_is_a_fraction(pnls in prop::collection::vec(-500.0f64..500.0, 0..60)) {
        let wr = win_rate(&pnls);
        prop_assert!((0.0..=1.0).contains(&wr));
    }

    #[test]
    fn profit_factor_capped(pnls in prop::collection::vec(-500.0f64..500.0, 0..60)) {
        let pf = profit_factor(&pnls);
        prop_assert!((0.0..=100.0).contains(&pf));
    }

    #[test]
    fn sharpe_needs_two_trades(r in -0.1f64..0.1) {
        prop_assert_eq!(sharpe_ratio(&[r], 252.0), None);
    }
}
