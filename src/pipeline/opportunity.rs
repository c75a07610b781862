use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DecisionReason;

/// Outcome of the export-now versus charge-later comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpportunityCostResult {
    pub should_charge_now: bool,
    pub export_revenue: f64,
    pub night_charge_cost: f64,
    pub reason: DecisionReason,
}

/// Minimum price across the night window, `None` when no data. The caller
/// pre-filters the points to the qualifying night hours.
pub fn find_cheapest_night_price(prices: &[(DateTime<Utc>, f64)]) -> Option<f64> {
    prices.iter().map(|&(_, p)| p).reduce(f64::min)
}

/// Economic inputs to the opportunity-cost comparison.
#[derive(Debug, Clone, Copy)]
pub struct OpportunityCostInputs {
    pub current_export_price: f64,
    pub cheapest_night_import_price: Option<f64>,
    pub grid_fee_import: f64,
    pub grid_fee_export: f64,
    pub export_compensation: f64,
    pub vat_rate: f64,
}

/// Compare selling exported solar now against buying the cheapest night
/// import later.
///
/// VAT applies only to the import side: consumption carries VAT, feed-in
/// compensation does not. Without night price data the comparison cannot be
/// made, so the conservative answer is to charge now. A tie also resolves
/// to charging now.
pub fn evaluate_opportunity_cost(inputs: OpportunityCostInputs) -> OpportunityCostResult {
    let export_revenue =
        inputs.current_export_price + inputs.export_compensation - inputs.grid_fee_export;

    let Some(cheapest) = inputs.cheapest_night_import_price else {
        return OpportunityCostResult {
            should_charge_now: true,
            export_revenue,
            night_charge_cost: 0.0,
            reason: DecisionReason::NoNightPricesAvailable,
        };
    };

    let night_charge_cost = (cheapest + inputs.grid_fee_import) * (1.0 + inputs.vat_rate);

    if export_revenue > night_charge_cost {
        return OpportunityCostResult {
            should_charge_now: false,
            export_revenue,
            night_charge_cost,
            reason: DecisionReason::ExportMoreProfitable,
        };
    }

    OpportunityCostResult {
        should_charge_now: true,
        export_revenue,
        night_charge_cost,
        reason: DecisionReason::ChargingNowCheaper,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn inputs(export_price: f64, night_price: Option<f64>) -> OpportunityCostInputs {
        OpportunityCostInputs {
            current_export_price: export_price,
            cheapest_night_import_price: night_price,
            grid_fee_import: 0.40,
            grid_fee_export: 0.05,
            export_compensation: 0.10,
            vat_rate: 0.25,
        }
    }

    #[test]
    fn cheapest_night_price_is_minimum() {
        let t = Utc.with_ymd_and_hms(2025, 1, 15, 22, 0, 0).unwrap();
        let prices = vec![(t, 0.9), (t, 0.3), (t, 0.5)];
        assert_eq!(find_cheapest_night_price(&prices), Some(0.3));
    }

    #[test]
    fn no_night_data_yields_none() {
        assert_eq!(find_cheapest_night_price(&[]), None);
    }

    #[test]
    fn charges_now_without_night_prices() {
        let result = evaluate_opportunity_cost(inputs(2.0, None));
        assert!(result.should_charge_now);
        assert_eq!(result.reason, DecisionReason::NoNightPricesAvailable);
        assert_eq!(result.night_charge_cost, 0.0);
    }

    #[rstest]
    // export 2.00 + 0.10 - 0.05 = 2.05 > (0.20 + 0.40) * 1.25 = 0.75 -> defer
    #[case(2.00, 0.20, false, DecisionReason::ExportMoreProfitable)]
    // export 0.10 + 0.10 - 0.05 = 0.15 < (0.80 + 0.40) * 1.25 = 1.50 -> charge
    #[case(0.10, 0.80, true, DecisionReason::ChargingNowCheaper)]
    fn compares_export_revenue_against_night_cost(
        #[case] export_price: f64,
        #[case] night_price: f64,
        #[case] should_charge: bool,
        #[case] reason: DecisionReason,
    ) {
        let result = evaluate_opportunity_cost(inputs(export_price, Some(night_price)));
        assert_eq!(result.should_charge_now, should_charge);
        assert_eq!(result.reason, reason);
    }

    #[test]
    fn tie_resolves_to_charging_now() {
        // revenue = 0.75 - 0.05 + 0.05 = 0.75, cost = (0.20 + 0.40) * 1.25 = 0.75
        let result = evaluate_opportunity_cost(OpportunityCostInputs {
            current_export_price: 0.75,
            cheapest_night_import_price: Some(0.20),
            grid_fee_import: 0.40,
            grid_fee_export: 0.05,
            export_compensation: 0.05,
            vat_rate: 0.25,
        });
        assert!(result.should_charge_now);
        assert_eq!(result.reason, DecisionReason::ChargingNowCheaper);
    }

    #[test]
    fn vat_applies_to_import_only() {
        let result = evaluate_opportunity_cost(inputs(1.0, Some(0.40)));
        assert!((result.export_revenue - 1.05).abs() < 1e-9);
        assert!((result.night_charge_cost - 1.0).abs() < 1e-9);
    }
}
