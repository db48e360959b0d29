use quotebase_core::db::open_db_in_memory;
use quotebase_core::model::{RecordRef, ValidationError};
use quotebase_core::{
    Caller, CoreConfig, EntityKind, LinkKind, MutationErrorKind, MutationOp, MutationService,
    QueryService, QuoteInput, QuoteUpdate,
};
use rusqlite::Connection;

fn editor() -> Caller {
    Caller::authenticated("editor")
}

fn row_count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[test]
fn anonymous_callers_are_rejected_before_any_write() {
    let conn = open_db_in_memory().unwrap();
    let config = CoreConfig::default();
    let service = MutationService::new(&conn, &config);

    let err = service
        .create_entity(&Caller::Anonymous, EntityKind::Author, "Plato")
        .unwrap_err();
    assert_eq!(err.op, MutationOp::CreateEntity(EntityKind::Author));
    assert!(matches!(err.kind, MutationErrorKind::Unauthorized));
    assert_eq!(err.to_string(), "create author failed: caller is not authenticated");

    let err = service
        .create_quote(
            &Caller::Anonymous,
            &QuoteInput {
                content: "The unexamined life is not worth living.".to_string(),
                ..QuoteInput::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err.kind, MutationErrorKind::Unauthorized));

    assert_eq!(row_count(&conn, "authors"), 0);
    assert_eq!(row_count(&conn, "quotes"), 0);
}

#[test]
fn entity_names_are_normalized_and_blank_names_rejected() {
    let conn = open_db_in_memory().unwrap();
    let config = CoreConfig::default();
    let service = MutationService::new(&conn, &config);

    let author = service
        .create_entity(&editor(), EntityKind::Author, "  Maya   Angelou ")
        .unwrap();
    assert_eq!(author.name, "Maya Angelou");
    assert_eq!(author.quotes_count, 0);

    let err = service
        .create_entity(&editor(), EntityKind::Category, " \t")
        .unwrap_err();
    assert!(matches!(
        err.kind,
        MutationErrorKind::InvalidInput(ValidationError::BlankName(EntityKind::Category))
    ));

    let renamed = service
        .update_entity(&editor(), EntityKind::Author, author.id, "Maya  Angelou (poet)")
        .unwrap();
    assert_eq!(renamed.name, "Maya Angelou (poet)");
    assert!(renamed.updated_at >= author.updated_at);
}

#[test]
fn blank_quote_content_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let config = CoreConfig::default();
    let service = MutationService::new(&conn, &config);

    let err = service
        .create_quote(
            &editor(),
            &QuoteInput {
                content: "   ".to_string(),
                ..QuoteInput::default()
            },
        )
        .unwrap_err();
    assert!(matches!(
        err.kind,
        MutationErrorKind::InvalidInput(ValidationError::BlankContent)
    ));
    assert_eq!(row_count(&conn, "quotes"), 0);
}

#[test]
fn unknown_references_are_not_found_and_leave_nothing_behind() {
    let conn = open_db_in_memory().unwrap();
    let config = CoreConfig::default();
    let service = MutationService::new(&conn, &config);
    let category = service
        .create_entity(&editor(), EntityKind::Category, "Hope")
        .unwrap();

    let err = service
        .create_quote(
            &editor(),
            &QuoteInput {
                content: "Hope is a waking dream.".to_string(),
                author_id: Some(404),
                category_ids: vec![category.id],
                ..QuoteInput::default()
            },
        )
        .unwrap_err();
    assert!(matches!(
        err.kind,
        MutationErrorKind::NotFound(RecordRef::Entity(EntityKind::Author, 404))
    ));

    let err = service
        .create_quote(
            &editor(),
            &QuoteInput {
                content: "Hope is a waking dream.".to_string(),
                category_ids: vec![category.id, 405],
                ..QuoteInput::default()
            },
        )
        .unwrap_err();
    assert!(matches!(
        err.kind,
        MutationErrorKind::NotFound(RecordRef::Entity(EntityKind::Category, 405))
    ));

    assert_eq!(row_count(&conn, "quotes"), 0);
    assert_eq!(row_count(&conn, "quote_categories"), 0);
    let query = QueryService::new(&conn, &config);
    assert_eq!(
        query
            .get_entity(EntityKind::Category, category.id)
            .unwrap()
            .quotes_count,
        0
    );

    let err = service
        .update_quote(&editor(), 999, &QuoteUpdate::default())
        .unwrap_err();
    assert!(matches!(
        err.kind,
        MutationErrorKind::NotFound(RecordRef::Quote(999))
    ));

    let err = service
        .delete_link(&editor(), LinkKind::Source, 12)
        .unwrap_err();
    assert!(matches!(
        err.kind,
        MutationErrorKind::NotFound(RecordRef::Link(LinkKind::Source, 12))
    ));
}

#[test]
fn referenced_entities_cannot_be_deleted() {
    let conn = open_db_in_memory().unwrap();
    let config = CoreConfig::default();
    let service = MutationService::new(&conn, &config);

    let author = service
        .create_entity(&editor(), EntityKind::Author, "Rumi")
        .unwrap();
    let source = service
        .create_entity(&editor(), EntityKind::Source, "Masnavi")
        .unwrap();
    let quote = service
        .create_quote(
            &editor(),
            &QuoteInput {
                content: "What you seek is seeking you.".to_string(),
                author_id: Some(author.id),
                source_ids: vec![source.id],
                ..QuoteInput::default()
            },
        )
        .unwrap();

    let err = service
        .delete_entity(&editor(), EntityKind::Author, author.id)
        .unwrap_err();
    assert!(matches!(
        err.kind,
        MutationErrorKind::InUse { references: 1, .. }
    ));
    let err = service
        .delete_entity(&editor(), EntityKind::Source, source.id)
        .unwrap_err();
    assert!(matches!(err.kind, MutationErrorKind::InUse { .. }));

    service.delete_quote(&editor(), quote.id).unwrap();
    assert_eq!(row_count(&conn, "quote_sources"), 0);

    service
        .delete_entity(&editor(), EntityKind::Author, author.id)
        .unwrap();
    service
        .delete_entity(&editor(), EntityKind::Source, source.id)
        .unwrap();
    assert_eq!(row_count(&conn, "authors"), 0);
    assert_eq!(row_count(&conn, "sources"), 0);
}

#[test]
fn update_quote_replaces_content_and_returns_hydrated_record() {
    let conn = open_db_in_memory().unwrap();
    let config = CoreConfig::default();
    let service = MutationService::new(&conn, &config);

    let zen = service
        .create_entity(&editor(), EntityKind::Category, "zen")
        .unwrap();
    let art = service
        .create_entity(&editor(), EntityKind::Category, "Art")
        .unwrap();
    let quote = service
        .create_quote(
            &editor(),
            &QuoteInput {
                content: "First draft".to_string(),
                category_ids: vec![zen.id],
                ..QuoteInput::default()
            },
        )
        .unwrap();
    assert_eq!(quote.language, "en");

    let updated = service
        .update_quote(
            &editor(),
            quote.id,
            &QuoteUpdate {
                content: Some("In the beginner's mind there are many possibilities.".to_string()),
                category_ids: Some(vec![zen.id, art.id]),
                ..QuoteUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(
        updated.content,
        "In the beginner's mind there are many possibilities."
    );
    let names: Vec<_> = updated
        .categories
        .iter()
        .map(|category| category.name.as_str())
        .collect();
    assert_eq!(names, vec!["Art", "zen"]);

    let err = service
        .update_quote(
            &editor(),
            quote.id,
            &QuoteUpdate {
                content: Some(String::new()),
                ..QuoteUpdate::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err.kind, MutationErrorKind::InvalidInput(_)));
}

#[test]
fn duplicate_links_are_rejected() {
    let conn = open_db_in_memory().unwrap();
    let config = CoreConfig::default();
    let service = MutationService::new(&conn, &config);

    let category = service
        .create_entity(&editor(), EntityKind::Category, "Courage")
        .unwrap();
    let quote = service
        .create_quote(
            &editor(),
            &QuoteInput {
                content: "Fortune favors the bold.".to_string(),
                category_ids: vec![category.id],
                ..QuoteInput::default()
            },
        )
        .unwrap();

    let err = service
        .create_link(&editor(), LinkKind::Category, quote.id, category.id)
        .unwrap_err();
    assert_eq!(err.op, MutationOp::CreateLink(LinkKind::Category));
    assert!(matches!(
        err.kind,
        MutationErrorKind::DuplicateLink { quote_id, target_id, .. }
            if quote_id == quote.id && target_id == category.id
    ));
    assert_eq!(row_count(&conn, "quote_categories"), 1);
}
