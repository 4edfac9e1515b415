//! Tag tables.
//!
//! Plain functions mapping resource keys to the tags they provide and
//! mutations to the tags they invalidate.

use std::collections::HashSet;

use serde_json::Value;

use super::keys::{CacheKey, ResourceKind, Tag, TagKind};
use super::mutation::Mutation;

/// Tags known from the key alone, before any data arrives.
pub fn static_tags(key: &CacheKey) -> HashSet<Tag> {
    let tag = match key.kind() {
        ResourceKind::Lands => Tag::coarse(TagKind::Lands),
        ResourceKind::UserLands => match key.user_id() {
            Some(user) => Tag::scoped(TagKind::UserLands, user),
            None => Tag::coarse(TagKind::UserLands),
        },
        ResourceKind::Products => Tag::coarse(TagKind::Products),
        ResourceKind::UserOrders | ResourceKind::AllOrders => Tag::coarse(TagKind::Orders),
        ResourceKind::Profile => match key.user_id() {
            Some(user) => Tag::scoped(TagKind::Profile, user),
            None => Tag::coarse(TagKind::Profile),
        },
    };
    HashSet::from([tag])
}

/// Full provided set for a resolved value: the static tags plus one scoped
/// tag per listed land, product or (admin view) order.
pub fn provided_tags(key: &CacheKey, result: &Value) -> HashSet<Tag> {
    let mut tags = static_tags(key);
    let item_kind = match key.kind() {
        ResourceKind::Lands => Some(TagKind::Lands),
        ResourceKind::Products => Some(TagKind::Products),
        ResourceKind::AllOrders => Some(TagKind::Orders),
        ResourceKind::UserLands | ResourceKind::UserOrders | ResourceKind::Profile => None,
    };
    if let Some(kind) = item_kind {
        tags.extend(item_ids(result).map(|id| Tag::scoped(kind, id)));
    }
    tags
}

/// Tags a successful mutation invalidates. `result` is the server response
/// and may refine identifiers the caller supplied (e.g. the land owner).
pub fn invalidated_tags(mutation: &Mutation, result: &Value) -> Vec<Tag> {
    match mutation {
        Mutation::CreateLand { owner_id, .. } => vec![
            Tag::coarse(TagKind::Lands),
            Tag::scoped(TagKind::UserLands, owner_of(result).unwrap_or(owner_id.as_str())),
        ],
        Mutation::UpdateLand {
            land_id, owner_id, ..
        } => vec![
            Tag::scoped(TagKind::Lands, land_id.as_str()),
            Tag::scoped(TagKind::UserLands, owner_of(result).unwrap_or(owner_id.as_str())),
        ],
        Mutation::DeleteLand { owner_id, .. } => vec![
            Tag::coarse(TagKind::Lands),
            Tag::scoped(TagKind::UserLands, owner_id.as_str()),
        ],
        Mutation::CreateProduct(_) | Mutation::DeleteProduct { .. } => {
            vec![Tag::coarse(TagKind::Products)]
        }
        Mutation::UpdateProduct { product_id, .. } => vec![
            Tag::coarse(TagKind::Products),
            Tag::scoped(TagKind::Products, product_id.as_str()),
        ],
        Mutation::PlaceOrder(_) => vec![Tag::coarse(TagKind::Orders)],
        Mutation::UpdateProfile { user_id, .. } => {
            vec![Tag::scoped(TagKind::Profile, user_id.as_str())]
        }
        Mutation::Login(_) | Mutation::Signup(_) => Vec::new(),
    }
}

fn item_ids(value: &Value) -> impl Iterator<Item = &str> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|item| item.get("_id").and_then(Value::as_str))
}

fn owner_of(result: &Value) -> Option<&str> {
    result
        .get("owner_id")
        .and_then(Value::as_str)
        .filter(|owner| !owner.is_empty())
}

#[cfg(test)]
mod tests {
    use agromart_api_types::{LandUpdate, NewOrder, ProductUpdate, ProfileUpdate};
    use serde_json::json;

    use super::*;

    fn set(tags: &[Tag]) -> HashSet<Tag> {
        tags.iter().cloned().collect()
    }

    #[test]
    fn static_tags_follow_resource_table() {
        assert_eq!(
            static_tags(&CacheKey::lands()),
            set(&[Tag::coarse(TagKind::Lands)])
        );
        assert_eq!(
            static_tags(&CacheKey::user_lands("u1")),
            set(&[Tag::scoped(TagKind::UserLands, "u1")])
        );
        assert_eq!(
            static_tags(&CacheKey::products(None)),
            set(&[Tag::coarse(TagKind::Products)])
        );
        assert_eq!(
            static_tags(&CacheKey::user_orders()),
            set(&[Tag::coarse(TagKind::Orders)])
        );
        assert_eq!(
            static_tags(&CacheKey::all_orders()),
            set(&[Tag::coarse(TagKind::Orders)])
        );
        assert_eq!(
            static_tags(&CacheKey::profile("u7")),
            set(&[Tag::scoped(TagKind::Profile, "u7")])
        );
    }

    #[test]
    fn list_results_add_per_item_tags() {
        let orders = json!([{ "_id": "o1" }, { "_id": "o2" }, { "total_amount": 3 }]);
        assert_eq!(
            provided_tags(&CacheKey::all_orders(), &orders),
            set(&[
                Tag::coarse(TagKind::Orders),
                Tag::scoped(TagKind::Orders, "o1"),
                Tag::scoped(TagKind::Orders, "o2"),
            ])
        );

        let lands = json!([{ "_id": "l1" }]);
        assert!(
            provided_tags(&CacheKey::lands(), &lands).contains(&Tag::scoped(TagKind::Lands, "l1"))
        );
        assert_eq!(
            provided_tags(&CacheKey::user_lands("u1"), &lands),
            set(&[Tag::scoped(TagKind::UserLands, "u1")])
        );
        assert_eq!(
            provided_tags(&CacheKey::products(None), &Value::Null),
            set(&[Tag::coarse(TagKind::Products)])
        );
    }

    #[test]
    fn land_mutations_invalidate_lists_and_owner() {
        let create = Mutation::CreateLand {
            owner_id: "u1".into(),
            land: serde_json::from_value(json!({
                "title": "North field",
                "location": {
                    "street_address": "1 Farm Rd", "city": "Nakuru",
                    "state_province": "Rift", "postal_code": "20100",
                    "country": "Kenya",
                    "coordinates": { "type": "Point", "values": [36.0, -0.3] }
                },
                "area": 4.0, "price_per_acre": 90.0, "soil_type": "loam",
                "water_availability": "high"
            }))
            .expect("land"),
        };
        assert_eq!(
            invalidated_tags(&create, &json!({ "owner_id": "u1" })),
            vec![
                Tag::coarse(TagKind::Lands),
                Tag::scoped(TagKind::UserLands, "u1")
            ]
        );

        let update = Mutation::UpdateLand {
            land_id: "l9".into(),
            owner_id: "caller".into(),
            updates: LandUpdate::default(),
        };
        assert_eq!(
            invalidated_tags(&update, &json!({ "owner_id": "owner" })),
            vec![
                Tag::scoped(TagKind::Lands, "l9"),
                Tag::scoped(TagKind::UserLands, "owner")
            ]
        );
        assert_eq!(
            invalidated_tags(&update, &Value::Null)[1],
            Tag::scoped(TagKind::UserLands, "caller")
        );

        let delete = Mutation::DeleteLand {
            land_id: "l9".into(),
            owner_id: "u1".into(),
        };
        assert_eq!(
            invalidated_tags(&delete, &Value::Null),
            vec![
                Tag::coarse(TagKind::Lands),
                Tag::scoped(TagKind::UserLands, "u1")
            ]
        );
    }

    #[test]
    fn store_and_profile_mutations() {
        assert_eq!(
            invalidated_tags(&Mutation::CreateProduct(ProductUpdate::default()), &Value::Null),
            vec![Tag::coarse(TagKind::Products)]
        );
        assert_eq!(
            invalidated_tags(
                &Mutation::UpdateProduct {
                    product_id: "p1".into(),
                    updates: ProductUpdate::default()
                },
                &Value::Null
            ),
            vec![
                Tag::coarse(TagKind::Products),
                Tag::scoped(TagKind::Products, "p1")
            ]
        );
        assert_eq!(
            invalidated_tags(
                &Mutation::DeleteProduct {
                    product_id: "p1".into()
                },
                &Value::Null
            ),
            vec![Tag::coarse(TagKind::Products)]
        );
        assert_eq!(
            invalidated_tags(
                &Mutation::PlaceOrder(NewOrder {
                    items: Vec::new(),
                    total_amount: 0.0
                }),
                &Value::Null
            ),
            vec![Tag::coarse(TagKind::Orders)]
        );
        assert_eq!(
            invalidated_tags(
                &Mutation::UpdateProfile {
                    user_id: "u3".into(),
                    updates: ProfileUpdate::default()
                },
                &Value::Null
            ),
            vec![Tag::scoped(TagKind::Profile, "u3")]
        );
    }
}
