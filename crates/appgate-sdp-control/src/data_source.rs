//! Lookup data sources, one per entity kind.

use async_trait::async_trait;
use serde_json::Value;

use appgate_sdp_core::EntityKind;

use crate::crud::TYPE_PREFIX;
use crate::error::Result;
use crate::resolver;
use crate::resource::{str_attr, Attrs, DataSource, OpContext};
use crate::schema::{AttrType, Attribute, Schema};

/// Looks up an entity of one kind by `<kind>_id` or `<kind>_name`.
pub struct EntityDataSource {
    type_name: String,
    kind: EntityKind,
    id_attr: String,
    name_attr: String,
    schema: Schema,
}

impl EntityDataSource {
    /// The data source for `kind`.
    #[must_use]
    pub fn new(kind: EntityKind) -> Self {
        let id_attr = format!("{kind}_id");
        let name_attr = format!("{kind}_name");
        let group = [id_attr.as_str(), name_attr.as_str()];
        let schema = Schema::new(0)
            .attr(&id_attr, Attribute::string().optional_computed().exactly_one_of(&group))
            .attr(&name_attr, Attribute::string().optional_computed().exactly_one_of(&group))
            .attr("id", Attribute::string().computed())
            .attr("notes", Attribute::string().computed())
            .attr("tags", Attribute::set(AttrType::String).computed());
        Self {
            type_name: format!("{TYPE_PREFIX}{kind}"),
            kind,
            id_attr,
            name_attr,
            schema,
        }
    }
}

#[async_trait]
impl DataSource for EntityDataSource {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn read(&self, ctx: &OpContext, config: &Attrs) -> Result<Attrs> {
        let entity = resolver::resolve(
            ctx.api(),
            self.kind,
            str_attr(config, &self.id_attr),
            str_attr(config, &self.name_attr),
        )
        .await?;

        let field = |key: &str| entity.get(key).cloned().unwrap_or(Value::Null);
        let mut state = Attrs::new();
        state.insert("id".to_string(), field("id"));
        state.insert(self.id_attr.clone(), field("id"));
        state.insert(self.name_attr.clone(), field("name"));
        state.insert("notes".to_string(), field("notes"));
        state.insert("tags".to_string(), field("tags"));
        Ok(state)
    }
}
