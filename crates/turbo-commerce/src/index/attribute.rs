//! Indexed attributes and the objects they are read from.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::ids::{CategoryId, ProductId};
use crate::index::worker::MULTISELECT_DELIMITER;

/// Whether an indexed object is a product or one of its variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    #[default]
    Object,
    Variant,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Object => "object",
            ObjectKind::Variant => "variant",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An object that can be written to a product index.
pub trait Indexable: Send + Sync {
    fn id(&self) -> ProductId;

    fn class_id(&self) -> &str;

    fn parent_id(&self) -> Option<ProductId>;

    fn kind(&self) -> ObjectKind;

    /// Id of the product a variant belongs to, the object itself otherwise.
    fn virtual_product_id(&self) -> ProductId {
        match self.kind() {
            ObjectKind::Variant => self.parent_id().unwrap_or_else(|| self.id()),
            ObjectKind::Object => self.id(),
        }
    }

    fn is_active(&self, in_product_list: bool) -> bool;

    fn virtual_product_active(&self) -> bool {
        self.is_active(false)
    }

    fn categories(&self) -> Vec<CategoryId>;

    /// Categories including all their ancestors.
    fn parent_category_ids(&self) -> Vec<CategoryId>;

    fn price_system_name(&self) -> Option<&str>;

    /// Raw value of a source field, localized when `locale` is given.
    fn field(&self, name: &str, locale: Option<&str>) -> Option<Value>;

    /// Whether the object should be in the index at all.
    fn do_index(&self) -> bool {
        true
    }
}

/// Plain data implementation of [`Indexable`], loadable from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexableDocument {
    pub id: ProductId,
    #[serde(default)]
    pub class_id: String,
    #[serde(default)]
    pub parent_id: Option<ProductId>,
    #[serde(default, rename = "type")]
    pub kind: ObjectKind,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_true")]
    pub in_product_list: bool,
    #[serde(default)]
    pub virtual_product_active: Option<bool>,
    #[serde(default)]
    pub categories: Vec<CategoryId>,
    #[serde(default)]
    pub parent_category_ids: Vec<CategoryId>,
    #[serde(default)]
    pub price_system_name: Option<String>,
    #[serde(default = "default_true")]
    pub do_index: bool,
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// Localized fields by locale.
    #[serde(default)]
    pub localized: BTreeMap<String, Map<String, Value>>,
}

fn default_true() -> bool {
    true
}

impl IndexableDocument {
    pub fn new(id: ProductId) -> Self {
        Self {
            id,
            class_id: String::new(),
            parent_id: None,
            kind: ObjectKind::Object,
            active: true,
            in_product_list: true,
            virtual_product_active: None,
            categories: Vec::new(),
            parent_category_ids: Vec::new(),
            price_system_name: None,
            do_index: true,
            fields: Map::new(),
            localized: BTreeMap::new(),
        }
    }

    pub fn variant_of(mut self, parent: ProductId) -> Self {
        self.kind = ObjectKind::Variant;
        self.parent_id = Some(parent);
        self
    }

    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    pub fn with_localized(mut self, locale: &str, name: &str, value: Value) -> Self {
        self.localized
            .entry(locale.to_string())
            .or_default()
            .insert(name.to_string(), value);
        self
    }

    pub fn with_categories(mut self, categories: impl IntoIterator<Item = CategoryId>) -> Self {
        self.categories = categories.into_iter().collect();
        if self.parent_category_ids.is_empty() {
            self.parent_category_ids = self.categories.clone();
        }
        self
    }

    pub fn with_price_system(mut self, name: &str) -> Self {
        self.price_system_name = Some(name.to_string());
        self
    }
}

impl Indexable for IndexableDocument {
    fn id(&self) -> ProductId {
        self.id
    }

    fn class_id(&self) -> &str {
        &self.class_id
    }

    fn parent_id(&self) -> Option<ProductId> {
        self.parent_id
    }

    fn kind(&self) -> ObjectKind {
        self.kind
    }

    fn is_active(&self, in_product_list: bool) -> bool {
        self.active && (!in_product_list || self.in_product_list)
    }

    fn virtual_product_active(&self) -> bool {
        self.virtual_product_active.unwrap_or(self.active)
    }

    fn categories(&self) -> Vec<CategoryId> {
        self.categories.clone()
    }

    fn parent_category_ids(&self) -> Vec<CategoryId> {
        self.parent_category_ids.clone()
    }

    fn price_system_name(&self) -> Option<&str> {
        self.price_system_name.as_deref()
    }

    fn field(&self, name: &str, locale: Option<&str>) -> Option<Value> {
        match locale {
            Some(locale) => self.localized.get(locale)?.get(name).cloned(),
            None => self.fields.get(name).cloned(),
        }
    }

    fn do_index(&self) -> bool {
        self.do_index
    }
}

/// Computes an attribute value from an object instead of reading a field.
pub trait Getter: Send + Sync {
    fn get(&self, object: &dyn Indexable, options: &Map<String, Value>) -> Option<Value>;
}

/// Reads the field named by the `source` option, in the `locale` option's locale.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldGetter;

impl Getter for FieldGetter {
    fn get(&self, object: &dyn Indexable, options: &Map<String, Value>) -> Option<Value> {
        let source = options.get("source")?.as_str()?;
        let locale = options.get("locale").and_then(Value::as_str);
        object.field(source, locale)
    }
}

/// Category ids of the object.
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoriesGetter;

impl Getter for CategoriesGetter {
    fn get(&self, object: &dyn Indexable, _options: &Map<String, Value>) -> Option<Value> {
        Some(Value::from(
            object.categories().into_iter().map(CategoryId::get).collect::<Vec<_>>(),
        ))
    }
}

pub fn getter_by_name(name: &str) -> Option<Arc<dyn Getter>> {
    match name {
        "field" => Some(Arc::new(FieldGetter)),
        "categories" => Some(Arc::new(CategoriesGetter)),
        _ => None,
    }
}

/// Transforms a raw attribute value into its indexed form.
pub trait Interpreter: Send + Sync {
    fn interpret(&self, value: Value, options: &Map<String, Value>) -> Value;

    /// Relation interpreters produce `{dest, type}` entries for the relation
    /// table instead of a column value.
    fn is_relation(&self) -> bool {
        false
    }
}

/// Object ids found in a value: a number, a numeric string, `{"id": n}`, or a list of those.
fn object_ids(value: &Value) -> Vec<i64> {
    match value {
        Value::Number(n) => n.as_i64().into_iter().collect(),
        Value::String(s) => s.trim().parse().ok().into_iter().collect(),
        Value::Object(map) => map.get("id").map(object_ids).unwrap_or_default(),
        Value::Array(items) => items.iter().flat_map(object_ids).collect(),
        _ => Vec::new(),
    }
}

/// Relation to other objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectRelations;

impl Interpreter for ObjectRelations {
    fn interpret(&self, value: Value, _options: &Map<String, Value>) -> Value {
        Value::Array(
            object_ids(&value)
                .into_iter()
                .map(|id| json!({"dest": id, "type": "object"}))
                .collect(),
        )
    }

    fn is_relation(&self) -> bool {
        true
    }
}

/// Comma separated id list, or `#;#` delimited with `multiSelectEncoded`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdList;

impl Interpreter for IdList {
    fn interpret(&self, value: Value, options: &Map<String, Value>) -> Value {
        let ids: Vec<String> = object_ids(&value).into_iter().map(|id| id.to_string()).collect();
        if ids.is_empty() {
            return Value::Null;
        }
        let encoded = options
            .get("multiSelectEncoded")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if encoded {
            Value::from(format!(
                "{d}{}{d}",
                ids.join(MULTISELECT_DELIMITER),
                d = MULTISELECT_DELIMITER
            ))
        } else {
            Value::from(ids.join(","))
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Numeric;

impl Interpreter for Numeric {
    fn interpret(&self, value: Value, _options: &Map<String, Value>) -> Value {
        match &value {
            Value::Number(_) | Value::Null => value,
            Value::String(s) => s.trim().parse::<f64>().map(Value::from).unwrap_or(Value::Null),
            Value::Bool(b) => Value::from(u8::from(*b)),
            _ => Value::Null,
        }
    }
}

pub fn interpreter_by_name(name: &str) -> Option<Arc<dyn Interpreter>> {
    match name {
        "objectRelations" => Some(Arc::new(ObjectRelations)),
        "idList" => Some(Arc::new(IdList)),
        "numeric" => Some(Arc::new(Numeric)),
        _ => None,
    }
}

/// One attribute of a tenant's index.
#[derive(Clone)]
pub struct Attribute {
    name: String,
    field_name: Option<String>,
    column_type: Option<String>,
    locale: Option<String>,
    filter_group: Option<String>,
    options: Map<String, Value>,
    getter: Option<Arc<dyn Getter>>,
    getter_options: Map<String, Value>,
    interpreter: Option<Arc<dyn Interpreter>>,
    interpreter_options: Map<String, Value>,
    hide_in_field_list: bool,
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("field_name", &self.field_name())
            .field("type", &self.column_type)
            .field("locale", &self.locale)
            .field("filter_group", &self.filter_group)
            .field("getter", &self.getter.is_some())
            .field("relation", &self.is_relation())
            .finish_non_exhaustive()
    }
}

impl Attribute {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_name: None,
            column_type: None,
            locale: None,
            filter_group: None,
            options: Map::new(),
            getter: None,
            getter_options: Map::new(),
            interpreter: None,
            interpreter_options: Map::new(),
            hide_in_field_list: false,
        }
    }

    pub fn with_field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = Some(field_name.into());
        self
    }

    pub fn with_type(mut self, column_type: impl Into<String>) -> Self {
        self.column_type = Some(column_type.into());
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_filter_group(mut self, group: impl Into<String>) -> Self {
        self.filter_group = Some(group.into());
        self
    }

    pub fn with_option(mut self, name: &str, value: Value) -> Self {
        self.options.insert(name.to_string(), value);
        self
    }

    pub fn with_getter(mut self, getter: Arc<dyn Getter>, options: Map<String, Value>) -> Self {
        self.getter = Some(getter);
        self.getter_options = options;
        self
    }

    pub fn with_interpreter(
        mut self,
        interpreter: Arc<dyn Interpreter>,
        options: Map<String, Value>,
    ) -> Self {
        self.interpreter = Some(interpreter);
        self.interpreter_options = options;
        self
    }

    pub fn hidden_in_field_list(mut self) -> Self {
        self.hide_in_field_list = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source field the value is read from, the attribute name by default.
    pub fn field_name(&self) -> &str {
        self.field_name.as_deref().unwrap_or(&self.name)
    }

    pub fn column_type(&self) -> Option<&str> {
        self.column_type.as_deref()
    }

    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    pub fn filter_group(&self) -> Option<&str> {
        self.filter_group.as_deref()
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.get(name)
    }

    pub fn hide_in_field_list(&self) -> bool {
        self.hide_in_field_list
    }

    pub fn is_relation(&self) -> bool {
        self.interpreter.as_ref().is_some_and(|i| i.is_relation())
    }

    /// Raw value: the getter's result, or the source field.
    pub fn value(&self, object: &dyn Indexable) -> Option<Value> {
        match &self.getter {
            Some(getter) => getter.get(object, &self.getter_options),
            None => object.field(self.field_name(), self.locale()),
        }
    }

    /// Indexed form of a raw value. Without an interpreter the value is kept.
    pub fn interpret(&self, value: Value) -> Value {
        match &self.interpreter {
            Some(interpreter) => interpreter.interpret(value, &self.interpreter_options),
            None => value,
        }
    }
}
