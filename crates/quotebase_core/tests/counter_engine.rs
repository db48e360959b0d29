use quotebase_core::counter::{CounterEngine, CounterError, CounterEvent};
use quotebase_core::db::open_db_in_memory;
use quotebase_core::{
    verify_counters, AuthorUpdate, Caller, CoreConfig, EntityKind, LinkKind, MutationErrorKind,
    MutationService, QueryService, QuoteInput, QuoteUpdate,
};
use rusqlite::{Connection, Transaction, TransactionBehavior};

fn editor() -> Caller {
    Caller::authenticated("editor")
}

fn stored_count(conn: &Connection, kind: EntityKind, id: i64) -> i64 {
    conn.query_row(
        &format!("SELECT quotes_count FROM {} WHERE id = ?1;", kind.table()),
        [id],
        |row| row.get(0),
    )
    .unwrap()
}

fn quote_exists(conn: &Connection, id: i64) -> bool {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM quotes WHERE id = ?1);",
            [id],
            |row| row.get(0),
        )
        .unwrap();
    exists == 1
}

#[test]
fn author_counter_follows_create_reassign_delete() {
    let conn = open_db_in_memory().unwrap();
    let config = CoreConfig::default();
    let service = MutationService::new(&conn, &config);

    let a = service
        .create_entity(&editor(), EntityKind::Author, "Marcus Aurelius")
        .unwrap();
    let b = service
        .create_entity(&editor(), EntityKind::Author, "Epictetus")
        .unwrap();
    assert_eq!(a.quotes_count, 0);

    let quote = service
        .create_quote(
            &editor(),
            &QuoteInput {
                content: "The impediment to action advances action.".to_string(),
                author_id: Some(a.id),
                ..QuoteInput::default()
            },
        )
        .unwrap();
    assert_eq!(stored_count(&conn, EntityKind::Author, a.id), 1);
    assert_eq!(quote.author.as_ref().map(|author| author.quotes_count), Some(1));

    service
        .update_quote(
            &editor(),
            quote.id,
            &QuoteUpdate {
                author: AuthorUpdate::Set(b.id),
                ..QuoteUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(stored_count(&conn, EntityKind::Author, a.id), 0);
    assert_eq!(stored_count(&conn, EntityKind::Author, b.id), 1);

    service.delete_quote(&editor(), quote.id).unwrap();
    assert_eq!(stored_count(&conn, EntityKind::Author, b.id), 0);
}

#[test]
fn reassigning_to_same_author_and_clearing_author() {
    let conn = open_db_in_memory().unwrap();
    let config = CoreConfig::default();
    let service = MutationService::new(&conn, &config);

    let author = service
        .create_entity(&editor(), EntityKind::Author, "Seneca")
        .unwrap();
    let quote = service
        .create_quote(
            &editor(),
            &QuoteInput {
                content: "While we teach, we learn.".to_string(),
                author_id: Some(author.id),
                ..QuoteInput::default()
            },
        )
        .unwrap();

    service
        .update_quote(
            &editor(),
            quote.id,
            &QuoteUpdate {
                author: AuthorUpdate::Set(author.id),
                ..QuoteUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(stored_count(&conn, EntityKind::Author, author.id), 1);

    let cleared = service
        .update_quote(
            &editor(),
            quote.id,
            &QuoteUpdate {
                author: AuthorUpdate::Clear,
                ..QuoteUpdate::default()
            },
        )
        .unwrap();
    assert!(cleared.author.is_none());
    assert_eq!(stored_count(&conn, EntityKind::Author, author.id), 0);
}

#[test]
fn association_counters_follow_link_mutations() {
    let conn = open_db_in_memory().unwrap();
    let config = CoreConfig::default();
    let service = MutationService::new(&conn, &config);

    let wisdom = service
        .create_entity(&editor(), EntityKind::Category, "Wisdom")
        .unwrap();
    let virtue = service
        .create_entity(&editor(), EntityKind::Category, "Virtue")
        .unwrap();
    let letters = service
        .create_entity(&editor(), EntityKind::Source, "Letters")
        .unwrap();

    let quote = service
        .create_quote(
            &editor(),
            &QuoteInput {
                content: "Luck is what happens when preparation meets opportunity.".to_string(),
                category_ids: vec![wisdom.id, wisdom.id],
                source_ids: vec![letters.id],
                ..QuoteInput::default()
            },
        )
        .unwrap();
    assert_eq!(quote.categories.len(), 1);
    assert_eq!(stored_count(&conn, EntityKind::Category, wisdom.id), 1);
    assert_eq!(stored_count(&conn, EntityKind::Source, letters.id), 1);

    let link = service
        .create_link(&editor(), LinkKind::Category, quote.id, virtue.id)
        .unwrap();
    assert_eq!(stored_count(&conn, EntityKind::Category, virtue.id), 1);

    let err = service
        .retarget_link(&editor(), LinkKind::Category, link.id, wisdom.id)
        .unwrap_err();
    assert!(matches!(err.kind, MutationErrorKind::DuplicateLink { .. }));
    assert_eq!(stored_count(&conn, EntityKind::Category, virtue.id), 1);

    service
        .delete_link(&editor(), LinkKind::Category, link.id)
        .unwrap();
    assert_eq!(stored_count(&conn, EntityKind::Category, virtue.id), 0);

    let replaced = service
        .update_quote(
            &editor(),
            quote.id,
            &QuoteUpdate {
                category_ids: Some(vec![virtue.id]),
                source_ids: Some(Vec::new()),
                ..QuoteUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(replaced.categories.len(), 1);
    assert!(replaced.sources.is_empty());
    assert_eq!(stored_count(&conn, EntityKind::Category, wisdom.id), 0);
    assert_eq!(stored_count(&conn, EntityKind::Category, virtue.id), 1);
    assert_eq!(stored_count(&conn, EntityKind::Source, letters.id), 0);

    service.delete_quote(&editor(), quote.id).unwrap();
    assert_eq!(stored_count(&conn, EntityKind::Category, virtue.id), 0);
}

#[test]
fn retargeting_a_link_moves_the_count() {
    let conn = open_db_in_memory().unwrap();
    let config = CoreConfig::default();
    let service = MutationService::new(&conn, &config);

    let first = service
        .create_entity(&editor(), EntityKind::Source, "Meditations")
        .unwrap();
    let second = service
        .create_entity(&editor(), EntityKind::Source, "Discourses")
        .unwrap();
    let quote = service
        .create_quote(
            &editor(),
            &QuoteInput {
                content: "No man is free who is not master of himself.".to_string(),
                ..QuoteInput::default()
            },
        )
        .unwrap();
    let link = service
        .create_link(&editor(), LinkKind::Source, quote.id, first.id)
        .unwrap();

    let moved = service
        .retarget_link(&editor(), LinkKind::Source, link.id, second.id)
        .unwrap();
    assert_eq!(moved.target_id, second.id);
    assert_eq!(stored_count(&conn, EntityKind::Source, first.id), 0);
    assert_eq!(stored_count(&conn, EntityKind::Source, second.id), 1);

    service
        .retarget_link(&editor(), LinkKind::Source, link.id, second.id)
        .unwrap();
    assert_eq!(stored_count(&conn, EntityKind::Source, second.id), 1);
}

#[test]
fn underflow_fails_the_mutation_and_rolls_back() {
    let conn = open_db_in_memory().unwrap();
    let config = CoreConfig::default();
    let service = MutationService::new(&conn, &config);

    let author = service
        .create_entity(&editor(), EntityKind::Author, "Heraclitus")
        .unwrap();
    let quote = service
        .create_quote(
            &editor(),
            &QuoteInput {
                content: "No man ever steps in the same river twice.".to_string(),
                author_id: Some(author.id),
                ..QuoteInput::default()
            },
        )
        .unwrap();
    conn.execute(
        "UPDATE authors SET quotes_count = 0 WHERE id = ?1;",
        [author.id],
    )
    .unwrap();

    let err = service.delete_quote(&editor(), quote.id).unwrap_err();
    match err.kind {
        MutationErrorKind::ConsistencyViolation(CounterError::WouldUnderflow { kind, id }) => {
            assert_eq!(kind, EntityKind::Author);
            assert_eq!(id, author.id);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(quote_exists(&conn, quote.id));
    assert_eq!(stored_count(&conn, EntityKind::Author, author.id), 0);
}

#[test]
fn missing_counter_target_is_reported() {
    let conn = open_db_in_memory().unwrap();
    let engine = CounterEngine::default();
    let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate).unwrap();

    let err = engine
        .apply(
            &tx,
            &CounterEvent::LinkInserted {
                kind: LinkKind::Category,
                target: 77,
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        CounterError::MissingTarget {
            kind: EntityKind::Category,
            id: 77
        }
    ));
}

#[test]
fn verify_on_write_rejects_drifted_counters() {
    let conn = open_db_in_memory().unwrap();
    let config = CoreConfig {
        verify_counters_on_write: true,
        ..CoreConfig::default()
    };
    let service = MutationService::new(&conn, &config);

    let author = service
        .create_entity(&editor(), EntityKind::Author, "Laozi")
        .unwrap();
    service
        .create_quote(
            &editor(),
            &QuoteInput {
                content: "A journey of a thousand miles begins with a single step.".to_string(),
                author_id: Some(author.id),
                ..QuoteInput::default()
            },
        )
        .unwrap();

    conn.execute(
        "UPDATE authors SET quotes_count = 5 WHERE id = ?1;",
        [author.id],
    )
    .unwrap();

    let err = service
        .create_quote(
            &editor(),
            &QuoteInput {
                content: "Knowing others is intelligence.".to_string(),
                author_id: Some(author.id),
                ..QuoteInput::default()
            },
        )
        .unwrap_err();
    match err.kind {
        MutationErrorKind::ConsistencyViolation(CounterError::Drift(drift)) => {
            assert_eq!(drift.stored, 6);
            assert_eq!(drift.live, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(stored_count(&conn, EntityKind::Author, author.id), 5);
}

fn assert_counters_exact(conn: &Connection, step: &str) {
    let drift = verify_counters(conn).unwrap();
    assert!(drift.is_empty(), "drift after {step}: {drift:?}");
}

#[test]
fn counters_stay_exact_after_every_step_of_a_mixed_sequence() {
    let conn = open_db_in_memory().unwrap();
    let config = CoreConfig::default();
    let service = MutationService::new(&conn, &config);
    let query = QueryService::new(&conn, &config);
    let entity = |kind, name: &str| service.create_entity(&editor(), kind, name).unwrap().id;

    let seneca = entity(EntityKind::Author, "Seneca");
    let cicero = entity(EntityKind::Author, "Cicero");
    let time = entity(EntityKind::Category, "Time");
    let death = entity(EntityKind::Category, "Death");
    let letters = entity(EntityKind::Source, "Moral Letters");
    let offices = entity(EntityKind::Source, "On Duties");
    assert_counters_exact(&conn, "entity creation");

    let first = service
        .create_quote(
            &editor(),
            &QuoteInput {
                content: "While we are postponing, life speeds by.".to_string(),
                author_id: Some(seneca),
                category_ids: vec![time, death],
                source_ids: vec![letters],
            },
        )
        .unwrap();
    assert_counters_exact(&conn, "first create");

    let second = service
        .create_quote(
            &editor(),
            &QuoteInput {
                content: "Omnia mutantur.".to_string(),
                author_id: Some(seneca),
                category_ids: vec![time],
                ..QuoteInput::default()
            },
        )
        .unwrap();
    assert_counters_exact(&conn, "second create");

    let steps: Vec<(&str, Box<dyn Fn() + '_>)> = vec![
        (
            "author reassign",
            Box::new(|| {
                service
                    .update_quote(
                        &editor(),
                        second.id,
                        &QuoteUpdate {
                            author: AuthorUpdate::Set(cicero),
                            ..QuoteUpdate::default()
                        },
                    )
                    .unwrap();
            }),
        ),
        (
            "author clear",
            Box::new(|| {
                service
                    .update_quote(
                        &editor(),
                        first.id,
                        &QuoteUpdate {
                            author: AuthorUpdate::Clear,
                            ..QuoteUpdate::default()
                        },
                    )
                    .unwrap();
            }),
        ),
        (
            "set replacement",
            Box::new(|| {
                service
                    .update_quote(
                        &editor(),
                        first.id,
                        &QuoteUpdate {
                            category_ids: Some(vec![death]),
                            source_ids: Some(vec![offices, letters]),
                            ..QuoteUpdate::default()
                        },
                    )
                    .unwrap();
            }),
        ),
        (
            "link create",
            Box::new(|| {
                service
                    .create_link(&editor(), LinkKind::Source, second.id, letters)
                    .unwrap();
            }),
        ),
        (
            "link retarget",
            Box::new(|| {
                let link = query
                    .list_links(LinkKind::Category, second.id)
                    .unwrap()
                    .remove(0);
                service
                    .retarget_link(&editor(), LinkKind::Category, link.id, death)
                    .unwrap();
            }),
        ),
        (
            "link delete",
            Box::new(|| {
                let link = query
                    .list_links(LinkKind::Source, first.id)
                    .unwrap()
                    .remove(0);
                service
                    .delete_link(&editor(), LinkKind::Source, link.id)
                    .unwrap();
            }),
        ),
        (
            "author restore",
            Box::new(|| {
                service
                    .update_quote(
                        &editor(),
                        first.id,
                        &QuoteUpdate {
                            author: AuthorUpdate::Set(seneca),
                            ..QuoteUpdate::default()
                        },
                    )
                    .unwrap();
            }),
        ),
        (
            "quote delete",
            Box::new(|| service.delete_quote(&editor(), first.id).unwrap()),
        ),
    ];

    for (step, run) in &steps {
        run();
        assert_counters_exact(&conn, step);
    }

    assert_eq!(stored_count(&conn, EntityKind::Author, seneca), 0);
    assert_eq!(stored_count(&conn, EntityKind::Author, cicero), 1);
    assert_eq!(stored_count(&conn, EntityKind::Category, time), 0);
    assert_eq!(stored_count(&conn, EntityKind::Category, death), 1);
    assert_eq!(stored_count(&conn, EntityKind::Source, letters), 1);
    assert_eq!(stored_count(&conn, EntityKind::Source, offices), 0);
}
