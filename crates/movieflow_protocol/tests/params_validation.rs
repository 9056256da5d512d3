//! Property tests for run parameter resolution and object key layout.

use chrono::NaiveDate;
use movieflow_protocol::{object_key, ObjectLayer, ParamsError, RequestedParams, SortBy};
use proptest::prelude::*;

fn sort_strategy() -> impl Strategy<Value = SortBy> {
    prop::sample::select(SortBy::ALL.to_vec())
}

proptest! {
    /// Valid quantity and sort order are published unchanged.
    #[test]
    fn valid_params_are_published_unchanged(
        search in "[a-z0-9/_-]{1,40}",
        sort in sort_strategy(),
        quantity in 0u64..10_000,
    ) {
        let resolved = RequestedParams::new(search.clone())
            .with_sort_by(sort.as_str())
            .with_quantity(quantity)
            .resolve()
            .unwrap();
        prop_assert_eq!(resolved.search, search);
        prop_assert_eq!(resolved.sort_by, sort);
        prop_assert_eq!(resolved.quantity, quantity);
    }

    #[test]
    fn negative_quantity_is_rejected(quantity in i64::MIN..0) {
        let err = RequestedParams::new("movies")
            .with_quantity(quantity)
            .resolve()
            .unwrap_err();
        prop_assert!(matches!(err, ParamsError::InvalidQuantity(_)));
    }

    #[test]
    fn unknown_sort_is_rejected(sort in "[a-z]{1,12}") {
        prop_assume!(!SortBy::ALL.iter().any(|s| s.as_str() == sort));
        let err = RequestedParams::new("movies")
            .with_sort_by(sort.clone())
            .resolve()
            .unwrap_err();
        prop_assert_eq!(err, ParamsError::InvalidSortBy(sort));
    }

    /// Keys always have exactly five segments and encode the date.
    #[test]
    fn object_keys_are_date_partitioned(days in 0i64..40_000) {
        let date = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap() + chrono::Duration::days(days);
        let key = object_key(ObjectLayer::Raw, date, "movies.csv");
        let parts: Vec<&str> = key.split('/').collect();
        prop_assert_eq!(parts.len(), 5);
        prop_assert_eq!(parts[0], "raw");
        let rebuilt = format!("{}-{}-{}", parts[1], parts[2], parts[3]);
        prop_assert_eq!(rebuilt, date.format("%Y-%m-%d").to_string());
    }
}

#[test]
fn params_deserialize_from_toml() {
    let requested: RequestedParams = toml::from_str(
        r#"
        search = "akshaypawar7/millions-of-movies"
        sort_by = "votes"
        quantity = 2
        "#,
    )
    .unwrap();
    let resolved = requested.resolve().unwrap();
    assert_eq!(resolved.sort_by, SortBy::Votes);
    assert_eq!(resolved.quantity, 2);
}

#[test]
fn float_quantity_from_toml_is_rejected() {
    let requested: RequestedParams = toml::from_str(
        r#"
        search = "movies"
        quantity = 1.5
        "#,
    )
    .unwrap();
    assert!(matches!(
        requested.resolve(),
        Err(ParamsError::InvalidQuantity(_))
    ));
}
