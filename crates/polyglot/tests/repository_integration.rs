//! Repository and query builder tests against an on-disk store.

use polyglot::{
    Conditions, EntityDef, Error, FieldDef, FieldRegistry, FindOptions, FindWhere, I18nOptions,
    LanguageConfig, MultilingualValue, OrderDirection, OrderSpec, Polyglot, Related, RelationDef,
    ScalarType, SchemaBundle, Value,
};
use polyglot_store::{StorageConfig, Store};
use pretty_assertions::assert_eq;
use std::ops::Deref;
use std::sync::Arc;
use tempfile::TempDir;

struct TestDb {
    db: Polyglot<Store>,
    _dir: TempDir,
}

impl TestDb {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = Store::open(StorageConfig::new(dir.path().join("data"))).unwrap();
        let db = Polyglot::with_registry(Arc::new(store), Arc::new(FieldRegistry::new()));
        Self { db, _dir: dir }
    }

    /// Declares the catalog fields and synchronizes the schema.
    async fn catalog() -> Self {
        let test = Self::new();
        for field in ["name", "description"] {
            test.declare(
                "Product",
                field,
                I18nOptions::new()
                    .with_languages(["en", "es", "fr"])
                    .with_default_language("en"),
            )
            .unwrap();
        }
        test.declare(
            "Category",
            "title",
            I18nOptions::new()
                .with_languages(["en", "fr"])
                .with_default_language("en"),
        )
        .unwrap();
        test.synchronize(schema()).await.unwrap();
        test
    }

    fn row(&self, entity: &str, id: &Value) -> std::collections::BTreeMap<String, Value> {
        self.backend().get_row(entity, id).unwrap().unwrap()
    }
}

impl Deref for TestDb {
    type Target = Polyglot<Store>;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

fn schema() -> SchemaBundle {
    SchemaBundle::new(1)
        .with_entity(EntityDef::new("Product", "id").with_fields([
            FieldDef::required("id", ScalarType::Int64),
            FieldDef::optional("price", ScalarType::Int64),
            FieldDef::optional("category_id", ScalarType::Int64),
        ]))
        .with_entity(EntityDef::new("Category", "id").with_fields([
            FieldDef::required("id", ScalarType::Int64),
        ]))
        .with_entity(EntityDef::new("Review", "id").with_fields([
            FieldDef::required("id", ScalarType::Int64),
            FieldDef::required("rating", ScalarType::Int64),
            FieldDef::optional("product_id", ScalarType::Int64),
        ]))
        .with_relation(RelationDef::many_to_one(
            "category",
            "Product",
            "category_id",
            "Category",
            "id",
        ))
        .with_relation(RelationDef::one_to_many(
            "products",
            "Category",
            "id",
            "Product",
            "category_id",
        ))
        .with_relation(RelationDef::many_to_one(
            "product", "Review", "product_id", "Product", "id",
        ))
}

fn names(en: &str, es: &str, fr: &str) -> MultilingualValue {
    MultilingualValue::new()
        .with("en", en)
        .with("es", es)
        .with("fr", fr)
}

async fn insert_product(test: &TestDb, name: MultilingualValue, price: i64) -> Value {
    let repo = test.repository("Product");
    let mut product = repo
        .create()
        .with("price", price)
        .with_translations("name", name);
    repo.save(&mut product).await.unwrap();
    product.get("id").cloned().unwrap()
}

#[tokio::test]
async fn test_synchronize_materializes_language_columns() {
    let test = TestDb::catalog().await;
    let schema = test.backend().catalog().current_schema().unwrap();
    let product = schema.get_entity("Product").unwrap();

    for column in ["name", "name_es", "name_fr", "description", "description_es"] {
        assert!(product.has_field(column), "missing column {column}");
    }
    assert!(product.get_field("name_es").unwrap().is_nullable());

    let category = schema.get_entity("Category").unwrap();
    assert!(category.has_field("title_fr"));
    assert!(!category.has_field("title_es"));
}

#[tokio::test]
async fn test_full_save_writes_every_language() {
    let test = TestDb::catalog().await;
    let id = insert_product(&test, names("Laptop", "Portátil", "Ordinateur"), 1200).await;

    let row = test.row("Product", &id);
    assert_eq!(row.get("name"), Some(&Value::from("Laptop")));
    assert_eq!(row.get("name_es"), Some(&Value::from("Portátil")));
    assert_eq!(row.get("name_fr"), Some(&Value::from("Ordinateur")));

    let repo = test.repository("Product").with_language("es");
    let product = repo
        .find_one_by(Conditions::new().eq("name", "Portátil"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(product.get("name"), Some(&Value::from("Portátil")));
    assert_eq!(product.language(), Some("es"));
    assert_eq!(
        product.translations("name"),
        Some(&names("Laptop", "Portátil", "Ordinateur"))
    );
    assert!(product.get("name_es").is_none());
}

#[tokio::test]
async fn test_partial_save_leaves_missing_languages_null() {
    let test = TestDb::catalog().await;
    let partial = MultilingualValue::new()
        .with("en", "Laptop")
        .with("es", "Portátil");
    let id = insert_product(&test, partial, 900).await;

    let row = test.row("Product", &id);
    assert_eq!(row.get("name_fr"), Some(&Value::Null));
    assert_eq!(row.get("description"), Some(&Value::Null));

    let fr = test.repository("Product").with_language("fr");
    let product = fr.find_one(FindOptions::new()).await.unwrap().unwrap();
    assert_eq!(product.get("name"), Some(&Value::Null));
    assert_eq!(
        product.translations("name").and_then(|t| t.get("fr")),
        Some(&Value::Null)
    );

    let default = test.repository("Product");
    let product = default.find_one(FindOptions::new()).await.unwrap().unwrap();
    assert_eq!(product.get("name"), Some(&Value::from("Laptop")));
}

#[tokio::test]
async fn test_single_language_update() {
    let test = TestDb::catalog().await;
    let id = insert_product(&test, names("Laptop", "Portátil", "Ordinateur"), 1200).await;

    let es = test.repository("Product").with_language("es");
    let mut product = es.find_one(FindOptions::new()).await.unwrap().unwrap();
    product.set("name", "Portátil nuevo");
    es.save(&mut product).await.unwrap();

    let row = test.row("Product", &id);
    assert_eq!(row.get("name"), Some(&Value::from("Laptop")));
    assert_eq!(row.get("name_es"), Some(&Value::from("Portátil nuevo")));
    assert_eq!(row.get("name_fr"), Some(&Value::from("Ordinateur")));

    assert_eq!(
        product.translations("name").and_then(|t| t.get("es")),
        Some(&Value::from("Portátil nuevo"))
    );
}

#[tokio::test]
async fn test_language_change_after_load_keeps_default_edit() {
    let test = TestDb::catalog().await;
    let id = insert_product(&test, names("Laptop", "Portátil", "Ordinateur"), 1200).await;

    let mut repo = test.repository("Product");
    let mut product = repo.find_one(FindOptions::new()).await.unwrap().unwrap();
    assert_eq!(product.language(), None);

    product.set("name", "Notebook");
    repo.set_language("es");
    repo.save(&mut product).await.unwrap();

    let row = test.row("Product", &id);
    assert_eq!(row.get("name"), Some(&Value::from("Notebook")));
    assert_eq!(row.get("name_es"), Some(&Value::from("Portátil")));
    assert_eq!(row.get("name_fr"), Some(&Value::from("Ordinateur")));
}

#[tokio::test]
async fn test_translations_view_edit_updates_one_language() {
    let test = TestDb::catalog().await;
    let id = insert_product(&test, names("Laptop", "Portátil", "Ordinateur"), 1200).await;

    let repo = test.repository("Product");
    let mut product = repo
        .find_one_by(Conditions::new().eq("id", id.clone()))
        .await
        .unwrap()
        .unwrap();
    product
        .translations_mut("name")
        .unwrap()
        .set("es", "Portátil Pro");
    repo.save(&mut product).await.unwrap();

    let reloaded = repo
        .find_one_by(Conditions::new().eq("id", id))
        .await
        .unwrap()
        .unwrap();
    let name = reloaded.translations("name").unwrap();
    assert_eq!(name.get("en"), Some(&Value::from("Laptop")));
    assert_eq!(name.get("es"), Some(&Value::from("Portátil Pro")));
    assert_eq!(name.get("fr"), Some(&Value::from("Ordinateur")));
    assert_eq!(reloaded.get("name"), Some(&Value::from("Laptop")));
}

#[tokio::test]
async fn test_concurrent_handles_edit_different_languages() {
    let test = TestDb::catalog().await;
    let id = insert_product(&test, names("Laptop", "Portátil", "Ordinateur"), 1200).await;

    let en = test.repository("Product");
    let fr = test.repository("Product").with_language("fr");
    let mut in_en = en.find_one(FindOptions::new()).await.unwrap().unwrap();
    let mut in_fr = fr.find_one(FindOptions::new()).await.unwrap().unwrap();

    in_en.set("name", "Notebook");
    in_fr.set("name", "Portable");
    en.save(&mut in_en).await.unwrap();
    fr.save(&mut in_fr).await.unwrap();

    let row = test.row("Product", &id);
    assert_eq!(row.get("name"), Some(&Value::from("Notebook")));
    assert_eq!(row.get("name_fr"), Some(&Value::from("Portable")));
}

#[tokio::test]
async fn test_translations_map_wins_over_scalar_edit() {
    let test = TestDb::catalog().await;
    let id = insert_product(&test, names("Laptop", "Portátil", "Ordinateur"), 1200).await;

    let es = test.repository("Product").with_language("es");
    let mut product = es.find_one(FindOptions::new()).await.unwrap().unwrap();
    product.set("name", "ignored");
    product
        .translations_mut("name")
        .unwrap()
        .set("es", "Portátil 2");
    es.save(&mut product).await.unwrap();

    let row = test.row("Product", &id);
    assert_eq!(row.get("name_es"), Some(&Value::from("Portátil 2")));
    assert_eq!(product.get("name"), Some(&Value::from("Portátil 2")));
}

#[tokio::test]
async fn test_unconfigured_language_in_map_is_rejected() {
    let test = TestDb::catalog().await;
    let repo = test.repository("Product");
    let mut product = repo
        .create()
        .with_translations("name", MultilingualValue::new().with("de", "Rechner"));

    let result = repo.save(&mut product).await;
    assert!(matches!(
        result,
        Err(Error::I18n(polyglot_core::Error::ColumnResolution { .. }))
    ));
}

#[tokio::test]
async fn test_rewrite_where_or_and_order() {
    let test = TestDb::catalog().await;
    insert_product(&test, names("Laptop", "Portátil", "Ordinateur"), 1200).await;
    insert_product(&test, names("Phone", "Teléfono", "Téléphone"), 800).await;
    insert_product(&test, names("Mouse", "Ratón", "Souris"), 20).await;

    let fr = test.repository("Product").with_language("FR");
    let filter = FindWhere::any(vec![
        Conditions::new().like("name", "T%"),
        Conditions::new().eq("name", "Souris").lt("price", 50i64),
    ]);
    let products = fr
        .find(
            FindOptions::new()
                .with_where(filter.clone())
                .with_order(OrderSpec::desc("name")),
        )
        .await
        .unwrap();
    let found: Vec<_> = products.iter().filter_map(|p| p.get("name")).collect();
    assert_eq!(found, vec![&Value::from("Téléphone"), &Value::from("Souris")]);

    assert_eq!(fr.count(Some(filter)).await.unwrap(), 2);
    assert!(fr.exists(Conditions::new().eq("name", "Ordinateur")).await.unwrap());
    assert!(!fr.exists(Conditions::new().eq("name", "Laptop")).await.unwrap());
}

#[tokio::test]
async fn test_untranslated_root_joined_to_translated_relation() {
    let test = TestDb::catalog().await;
    let laptop = insert_product(&test, names("Laptop", "Portátil", "Ordinateur"), 1200).await;
    let phone = insert_product(&test, names("Phone", "Teléfono", "Téléphone"), 800).await;

    let reviews = test.repository("Review");
    for (product, rating) in [(&laptop, 5i64), (&phone, 3), (&laptop, 4)] {
        let mut review = reviews
            .create()
            .with("product_id", product.clone())
            .with("rating", rating);
        reviews.save(&mut review).await.unwrap();
    }

    let found = reviews
        .create_query_builder("review")
        .set_language("fr")
        .left_join_and_select("review.product", "product")
        .unwrap()
        .where_(Conditions::new().eq("product.name", "Ordinateur"))
        .unwrap()
        .order_by("review.rating", OrderDirection::Asc)
        .unwrap()
        .get_many()
        .await
        .unwrap();

    let ratings: Vec<_> = found.iter().filter_map(|r| r.get("rating")).collect();
    assert_eq!(ratings, vec![&Value::Int64(4), &Value::Int64(5)]);

    let product = found[0]
        .relation("product")
        .and_then(Related::as_one)
        .unwrap();
    assert_eq!(product.get("name"), Some(&Value::from("Ordinateur")));
    assert_eq!(product.language(), Some("fr"));
    assert_eq!(
        product.translations("name").and_then(|t| t.get("en")),
        Some(&Value::from("Laptop"))
    );
}

#[tokio::test]
async fn test_query_builder_dnf_paging_and_count() {
    let test = TestDb::catalog().await;
    insert_product(&test, names("Laptop", "Portátil", "Ordinateur"), 1200).await;
    insert_product(&test, names("Phone", "Teléfono", "Téléphone"), 800).await;
    insert_product(&test, names("Mouse", "Ratón", "Souris"), 20).await;

    let builder = test
        .repository("Product")
        .with_language("es")
        .create_query_builder("p")
        .where_(Conditions::new().eq("p.name", "Portátil"))
        .unwrap()
        .or_where(Conditions::new().eq("p.name", "Ratón"))
        .unwrap()
        .and_where(Conditions::new().gt("p.price", 10i64))
        .unwrap()
        .order_by("p.name", OrderDirection::Asc)
        .unwrap();

    assert_eq!(builder.get_count().await.unwrap(), 2);

    let first = builder.get_one_or_fail().await.unwrap();
    assert_eq!(first.get("name"), Some(&Value::from("Portátil")));

    let second = builder.skip(1).take(5).get_many().await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].get("name"), Some(&Value::from("Ratón")));
}

#[tokio::test]
async fn test_query_builder_select_and_group() {
    let test = TestDb::catalog().await;
    insert_product(&test, names("Laptop", "Portátil", "Ordinateur"), 1200).await;
    insert_product(&test, names("Laptop", "Portátil", "Portable"), 999).await;

    let rows = test
        .repository("Product")
        .create_query_builder("p")
        .set_language("es")
        .select(&["p.name"])
        .unwrap()
        .group_by("p.name")
        .unwrap()
        .get_many()
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&Value::from("Portátil")));
    assert!(rows[0].get("price").is_none());
}

#[tokio::test]
async fn test_query_builder_unknown_alias() {
    let test = TestDb::catalog().await;
    let result = test
        .repository("Product")
        .create_query_builder("p")
        .where_(Conditions::new().eq("c.title", "Laptops"));
    assert!(matches!(result, Err(Error::UnknownAlias { alias }) if alias == "c"));
}

#[tokio::test]
async fn test_language_handling() {
    let test = TestDb::catalog().await;
    let mut repo = test.repository("Product");

    assert_eq!(repo.get_language(), None);
    assert_eq!(repo.get_language_column("name").unwrap(), "name");

    repo.set_language("FR");
    assert_eq!(repo.get_language(), Some("fr"));
    assert_eq!(repo.get_language_column("name").unwrap(), "name_fr");
    assert_eq!(repo.get_language_column("price").unwrap(), "price");

    let other = repo.clone().with_language("es");
    assert_eq!(repo.get_language(), Some("fr"));
    assert_eq!(other.get_language(), Some("es"));

    repo.clear_language();
    assert_eq!(repo.get_language(), None);
}

#[tokio::test]
async fn test_find_one_or_fail_and_backend_errors() {
    let test = TestDb::catalog().await;
    let repo = test.repository("Product");

    let result = repo.find_one_or_fail(FindOptions::new()).await;
    assert!(matches!(result, Err(Error::EntityNotFound { .. })));

    let result = test.repository("Vendor").find(FindOptions::new()).await;
    assert!(matches!(
        result,
        Err(Error::Backend(polyglot_store::Error::UnknownEntity { .. }))
    ));
}

#[tokio::test]
async fn test_pending_fields_resolve_on_global_config() {
    let test = TestDb::new();
    let state = test
        .declare("Category", "title", I18nOptions::new())
        .unwrap();
    assert!(state.is_pending());

    let resolved = test
        .registry()
        .set_global_config(LanguageConfig::new(["EN", "de"], "en"))
        .unwrap();
    assert_eq!(resolved, 1);
    assert_eq!(test.registry().finalize_pending().unwrap(), 0);
    assert_eq!(test.registry().finalize_pending().unwrap(), 0);

    let schema = test.synchronize(schema()).await.unwrap();
    let category = schema.get_entity("Category").unwrap();
    assert!(category.has_field("title"));
    assert!(category.has_field("title_de"));

    let repo = test.repository("Category").with_language("de");
    let mut category = repo
        .create()
        .with_translations("title", MultilingualValue::new().with("en", "Computers"));
    repo.save(&mut category).await.unwrap();
    assert_eq!(category.get("title"), Some(&Value::Null));
}

#[tokio::test]
async fn test_relations_decomposed_without_root_fields() {
    let test = TestDb::catalog().await;
    let categories = test.repository("Category");
    let mut category = categories.create().with_translations(
        "title",
        MultilingualValue::new()
            .with("en", "Computers")
            .with("fr", "Ordinateurs"),
    );
    categories.save(&mut category).await.unwrap();
    let category_id = category.get("id").cloned().unwrap();

    let products = test.repository("Product");
    let mut product = products
        .create()
        .with("category_id", category_id)
        .with_translations("name", names("Laptop", "Portátil", "Ordinateur"));
    products.save(&mut product).await.unwrap();

    let fr = test.repository("Category").with_language("fr");
    let loaded = fr
        .find_one(FindOptions::new().with_relation("products"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.get("title"), Some(&Value::from("Ordinateurs")));

    let children = loaded
        .relation("products")
        .and_then(Related::as_many)
        .unwrap();
    assert_eq!(children[0].get("name"), Some(&Value::from("Ordinateur")));
}
