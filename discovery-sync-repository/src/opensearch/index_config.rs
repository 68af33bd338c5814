//! Index template and lifecycle policy bodies for category indices.

use discovery_sync_shared::IndexNaming;
use serde_json::{json, Value};

use crate::config::IndexSettings;

/// Version stamped on the index template. Bump when the mappings change.
pub const CATEGORY_MAPPINGS_VERSION: u32 = 2;

/// Priority of the template over broader templates matching the same indices.
const TEMPLATE_PRIORITY: u32 = 500;

/// Composable index template for the entity's monthly indices.
///
/// Matches this environment's monthly indices and joins every index it
/// creates to the entity's alias, so a month's index that the first write
/// creates is readable through the alias at once. It also carries the
/// shard layout and mappings:
/// - `id`, `status` and `sync_status` as keywords for filtering
/// - `name` as text with a `keyword` sub-field for exact matches and sorting
/// - `description` as text
/// - timestamps as dates and `version` as a long
///
/// # Arguments
///
/// * `naming` - Naming of the entity whose indices the template covers
/// * `settings` - Shard layout and lifecycle policy name
pub fn category_template(naming: &IndexNaming, settings: &IndexSettings) -> Value {
    json!({
        "index_patterns": [naming.index_pattern()],
        "priority": TEMPLATE_PRIORITY,
        "version": CATEGORY_MAPPINGS_VERSION,
        "_meta": {
            "description": format!("Template for {} {} indices", naming.service, naming.entity),
            "service": naming.service,
            "entity": naming.entity,
            "lifecycle_policy": settings.policy_name,
        },
        "template": {
            "aliases": {
                naming.alias_name(): {}
            },
            "settings": {
                "number_of_shards": settings.number_of_shards,
                "number_of_replicas": settings.number_of_replicas
            },
            "mappings": {
                "properties": {
                    "id": { "type": "keyword" },
                    "name": {
                        "type": "text",
                        "fields": {
                            "keyword": { "type": "keyword", "ignore_above": 256 }
                        }
                    },
                    "description": { "type": "text" },
                    "status": { "type": "keyword" },
                    "sync_status": { "type": "keyword" },
                    "last_sync": { "type": "date" },
                    "created_at": { "type": "date" },
                    "updated_at": { "type": "date" },
                    "version": { "type": "long" }
                }
            }
        }
    })
}

/// Retention policy attached to new indices of the entity.
///
/// Indices stay hot until `warm_after_days`, are then merged down and
/// deprioritized, go cold at `cold_after_days` and are deleted at
/// `delete_after_days`. The policy attaches itself to new indices matching
/// the naming's template pattern.
pub fn lifecycle_policy(naming: &IndexNaming, settings: &IndexSettings) -> Value {
    let thresholds = settings.lifecycle;
    json!({
        "policy": {
            "description": format!("Retention for {} {} indices", naming.service, naming.entity),
            "default_state": "hot",
            "states": [
                {
                    "name": "hot",
                    "actions": [
                        { "index_priority": { "priority": 100 } }
                    ],
                    "transitions": [
                        {
                            "state_name": "warm",
                            "conditions": { "min_index_age": format!("{}d", thresholds.warm_after_days) }
                        }
                    ]
                },
                {
                    "name": "warm",
                    "actions": [
                        { "force_merge": { "max_num_segments": 1 } },
                        { "shrink": { "num_new_shards": 1, "force_unsafe": true } },
                        { "index_priority": { "priority": 50 } }
                    ],
                    "transitions": [
                        {
                            "state_name": "cold",
                            "conditions": { "min_index_age": format!("{}d", thresholds.cold_after_days) }
                        }
                    ]
                },
                {
                    "name": "cold",
                    "actions": [
                        { "index_priority": { "priority": 0 } }
                    ],
                    "transitions": [
                        {
                            "state_name": "delete",
                            "conditions": { "min_index_age": format!("{}d", thresholds.delete_after_days) }
                        }
                    ]
                },
                {
                    "name": "delete",
                    "actions": [
                        { "delete": {} }
                    ],
                    "transitions": []
                }
            ],
            "ism_template": [
                {
                    "index_patterns": [naming.template_pattern()],
                    "priority": 100
                }
            ]
        }
    })
}
