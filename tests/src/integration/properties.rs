//! # Broker Properties
//!
//! Randomised checks of broker fan-out against a direct reading of the
//! matching rules: `"*"` and `0` are wildcards, any other slot matches by
//! equality, and on-change requests skip plain `Update`s.

#[cfg(test)]
mod tests {
    use crate::fixtures::key;
    use mal_broker::{BrokerEngine, BrokerHandler};
    use mal_types::{
        Element, EntityKey, EntityRequest, MessageHeader, Subscription, UpdateHeader, UpdateType,
        Uri,
    };
    use proptest::prelude::*;

    fn header(from: &str) -> MessageHeader {
        MessageHeader {
            uri_from: Uri::new(from),
            service_area: 1,
            service: 1,
            operation: 1,
            area_version: 1,
            ..MessageHeader::default()
        }
    }

    fn pattern() -> impl Strategy<Value = EntityKey> {
        (prop_oneof!["\\*", "[ab]"], 0i64..3, 0i64..3)
            .prop_map(|(first, second, third)| key(&first, second, third, 0))
    }

    fn concrete() -> impl Strategy<Value = (EntityKey, bool)> {
        ("[ab]", 1i64..3, 1i64..3, any::<bool>())
            .prop_map(|(first, second, third, changed)| (key(&first, second, third, 1), changed))
    }

    fn covers(pattern: &EntityKey, update: &EntityKey) -> bool {
        fn slot<T: PartialEq>(p: &Option<T>, u: &Option<T>, wildcard: &T) -> bool {
            p.as_ref() == Some(wildcard) || p == u
        }
        slot(&pattern.first_sub_key, &update.first_sub_key, &"*".into())
            && slot(&pattern.second_sub_key, &update.second_sub_key, &0)
            && slot(&pattern.third_sub_key, &update.third_sub_key, &0)
            && slot(&pattern.fourth_sub_key, &update.fourth_sub_key, &0)
    }

    proptest! {
        #[test]
        fn prop_fan_out_matches_each_subscription(
            subscriptions in prop::collection::vec((pattern(), any::<bool>()), 1..4),
            updates in prop::collection::vec(concrete(), 1..6),
        ) {
            let engine = BrokerEngine::new();
            let publisher = header("malmem://publisher");
            engine.add_provider(&publisher, &[EntityKey::wildcard()]).unwrap();

            let consumers: Vec<Uri> = (0..subscriptions.len())
                .map(|i| Uri::new(format!("malmem://consumer-{}", i)))
                .collect();
            for (uri, (pattern, on_change)) in consumers.iter().zip(&subscriptions) {
                let subscription = Subscription::new(
                    "sub",
                    vec![EntityRequest::new(*on_change, vec![pattern.clone()])],
                );
                engine.add_consumer(&header(uri.as_str()), &subscription).unwrap();
            }

            let update_headers: Vec<UpdateHeader> = updates
                .iter()
                .map(|(key, changed)| {
                    let update_type = if *changed { UpdateType::Modification } else { UpdateType::Update };
                    UpdateHeader::new(publisher.uri_from.clone(), update_type, key.clone())
                })
                .collect();
            let values: Vec<Element> = (0..updates.len() as i64).map(Element::Long).collect();

            engine.check_publish(&publisher, &update_headers).unwrap();
            let sets = engine
                .create_notify(&publisher, &update_headers, &[values.clone()])
                .unwrap();

            for (uri, (pattern, on_change)) in consumers.iter().zip(&subscriptions) {
                let expected: Vec<usize> = update_headers
                    .iter()
                    .enumerate()
                    .filter(|(_, u)| covers(pattern, &u.key) && (!on_change || u.update_type.is_change()))
                    .map(|(i, _)| i)
                    .collect();

                let set = sets.iter().find(|s| &s.consumer == uri);
                if expected.is_empty() {
                    prop_assert!(set.is_none());
                    continue;
                }
                let set = set.unwrap();
                prop_assert_eq!(set.updates.len(), 1);
                let update = &set.updates[0];
                let got: Vec<&UpdateHeader> = update.update_headers.iter().collect();
                let want: Vec<&UpdateHeader> = expected.iter().map(|&i| &update_headers[i]).collect();
                prop_assert_eq!(got, want);
                let want_values: Vec<Element> = expected.iter().map(|&i| values[i].clone()).collect();
                prop_assert_eq!(&update.value_lists, &vec![want_values]);
            }
        }
    }
}
