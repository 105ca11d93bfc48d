//! Bid criteria evaluation
//!
//! Pure matching of buyer-supplied constraints against a call's
//! attributes. Criteria are descriptive only: a bid whose constraints
//! reject a call is simply ineligible for that auction.

use crate::compliance::in_local_window;
use chrono::{DateTime, Utc};
use ringbid_core::models::{Bid, BidCriteria, Call};
use ringbid_core::AppResult;

/// True when the bid's criteria accept the call at `at`
///
/// A constraint against an attribute the call does not carry is
/// unsatisfied: a geography-constrained bid never matches a call with
/// unknown geography.
pub fn bid_matches_call(bid: &Bid, call: &Call, at: DateTime<Utc>) -> AppResult<bool> {
    let criteria = &bid.criteria;

    if !matches_tag(&criteria.geographies, call.geography.as_deref()) {
        return Ok(false);
    }
    if !matches_tag(&criteria.call_types, call.call_type.as_deref()) {
        return Ok(false);
    }
    if hits_excluded_keyword(criteria, &call.keywords) {
        return Ok(false);
    }
    if !in_window(criteria, at) {
        return Ok(false);
    }
    if let Some(budget) = &criteria.max_budget {
        // a ceiling in a different currency propagates as an error and
        // the caller treats the bid as ineligible
        if bid.amount.try_cmp(budget)? == std::cmp::Ordering::Greater {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_tag(allowed: &[String], value: Option<&str>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match value {
        Some(v) => allowed.iter().any(|a| a.eq_ignore_ascii_case(v)),
        None => false,
    }
}

fn hits_excluded_keyword(criteria: &BidCriteria, keywords: &[String]) -> bool {
    criteria.excluded_keywords.iter().any(|excluded| {
        keywords
            .iter()
            .any(|k| k.eq_ignore_ascii_case(excluded))
    })
}

fn in_window(criteria: &BidCriteria, at: DateTime<Utc>) -> bool {
    match (criteria.window_start, criteria.window_end) {
        (Some(start), Some(end)) => {
            in_local_window(at, start, end, criteria.utc_offset_minutes)
        }
        // a half-specified window constrains nothing
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveTime, TimeZone};
    use ringbid_core::models::{BidStatus, Currency, Money};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn usd(amount: Decimal) -> Money {
        Money::new(amount, Currency::USD)
    }

    fn bid_with(criteria: BidCriteria, amount: Money) -> Bid {
        let now = Utc::now();
        Bid {
            id: Uuid::new_v4(),
            call_id: Uuid::new_v4(),
            buyer_id: 1,
            seller_id: None,
            auction_id: None,
            amount,
            status: BidStatus::Active,
            rank: None,
            criteria,
            quality: Decimal::ZERO,
            placed_at: now,
            expires_at: now + Duration::seconds(60),
            accepted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn call_with(geography: Option<&str>, call_type: Option<&str>, keywords: &[&str]) -> Call {
        let now = Utc::now();
        Call {
            id: Uuid::new_v4(),
            from_number: "15551230001".to_string(),
            to_number: "15551230002".to_string(),
            status: Default::default(),
            direction: Default::default(),
            buyer_id: None,
            seller_id: Some(2),
            geography: geography.map(str::to_string),
            call_type: call_type.map(str::to_string),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            start_time: now,
            end_time: None,
            duration_secs: None,
            cost: None,
            termination_cause: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_empty_criteria_match_anything() {
        let bid = bid_with(BidCriteria::default(), usd(dec!(10)));
        let call = call_with(None, None, &[]);
        assert!(bid_matches_call(&bid, &call, Utc::now()).unwrap());
    }

    #[test]
    fn test_geography_constraint() {
        let criteria = BidCriteria {
            geographies: vec!["US-TX".to_string(), "US-OK".to_string()],
            ..Default::default()
        };
        let bid = bid_with(criteria, usd(dec!(10)));

        assert!(bid_matches_call(&bid, &call_with(Some("us-tx"), None, &[]), Utc::now()).unwrap());
        assert!(!bid_matches_call(&bid, &call_with(Some("US-CA"), None, &[]), Utc::now()).unwrap());
        // constrained bid never matches a call with unknown geography
        assert!(!bid_matches_call(&bid, &call_with(None, None, &[]), Utc::now()).unwrap());
    }

    #[test]
    fn test_call_type_constraint() {
        let criteria = BidCriteria {
            call_types: vec!["insurance".to_string()],
            ..Default::default()
        };
        let bid = bid_with(criteria, usd(dec!(10)));

        assert!(
            bid_matches_call(&bid, &call_with(None, Some("Insurance"), &[]), Utc::now()).unwrap()
        );
        assert!(
            !bid_matches_call(&bid, &call_with(None, Some("solar"), &[]), Utc::now()).unwrap()
        );
    }

    #[test]
    fn test_excluded_keywords() {
        let criteria = BidCriteria {
            excluded_keywords: vec!["litigation".to_string()],
            ..Default::default()
        };
        let bid = bid_with(criteria, usd(dec!(10)));

        assert!(!bid_matches_call(
            &bid,
            &call_with(None, None, &["Litigation", "quote"]),
            Utc::now()
        )
        .unwrap());
        assert!(bid_matches_call(&bid, &call_with(None, None, &["quote"]), Utc::now()).unwrap());
    }

    #[test]
    fn test_time_window() {
        let criteria = BidCriteria {
            window_start: NaiveTime::from_hms_opt(9, 0, 0),
            window_end: NaiveTime::from_hms_opt(17, 0, 0),
            utc_offset_minutes: 0,
            ..Default::default()
        };
        let bid = bid_with(criteria, usd(dec!(10)));
        let call = call_with(None, None, &[]);

        let noon = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).single().unwrap();
        let night = Utc.with_ymd_and_hms(2026, 3, 10, 22, 0, 0).single().unwrap();
        assert!(bid_matches_call(&bid, &call, noon).unwrap());
        assert!(!bid_matches_call(&bid, &call, night).unwrap());
    }

    #[test]
    fn test_max_budget() {
        let criteria = BidCriteria {
            max_budget: Some(usd(dec!(15))),
            ..Default::default()
        };
        let call = call_with(None, None, &[]);

        let within = bid_with(criteria.clone(), usd(dec!(15)));
        assert!(bid_matches_call(&within, &call, Utc::now()).unwrap());

        let over = bid_with(criteria, usd(dec!(15.01)));
        assert!(!bid_matches_call(&over, &call, Utc::now()).unwrap());
    }

    #[test]
    fn test_max_budget_currency_mismatch_is_error() {
        let criteria = BidCriteria {
            max_budget: Some(Money::new(dec!(15), Currency::EUR)),
            ..Default::default()
        };
        let bid = bid_with(criteria, usd(dec!(10)));
        let call = call_with(None, None, &[]);
        assert!(bid_matches_call(&bid, &call, Utc::now()).is_err());
    }
}
