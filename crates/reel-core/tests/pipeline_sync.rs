//! End-to-end behavior of the pipeline service over real storage

use reel_core::snapshot::{self, ArchiveDoc, PipelineDoc};
use reel_core::{
    Change, Config, FsBackend, MemBackend, NewCard, Origin, Pipeline, Scheduling, Slot, StageId,
    StorageBackend, SyncEvent, parse_date,
};
use std::cell::RefCell;
use std::rc::Rc;
use tempfile::TempDir;

fn open(dir: &TempDir) -> Pipeline<FsBackend> {
    Pipeline::open(dir.path()).unwrap()
}

fn titles(pipeline: &Pipeline<impl StorageBackend>, stage: StageId) -> Vec<String> {
    pipeline
        .cards()
        .stage_cards(stage)
        .iter()
        .map(|c| c.title.clone())
        .collect()
}

fn orders(pipeline: &Pipeline<impl StorageBackend>, stage: StageId) -> Vec<usize> {
    pipeline
        .cards()
        .stage_cards(stage)
        .iter()
        .map(|c| c.order)
        .collect()
}

fn record(pipeline: &mut Pipeline<impl StorageBackend>) -> Rc<RefCell<Vec<SyncEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    pipeline.subscribe(move |event| sink.borrow_mut().push(event.clone()));
    events
}

#[test]
fn move_between_stages_renumbers_both() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = open(&dir);
    pipeline.add_card(StageId::Ideate, NewCard::titled("A"));
    let b = pipeline.add_card(StageId::Ideate, NewCard::titled("B"));
    pipeline.add_card(StageId::Ideate, NewCard::titled("C"));

    assert!(pipeline.move_card(&b.id, StageId::ToFilm, 0));

    assert_eq!(titles(&pipeline, StageId::Ideate), vec!["A", "C"]);
    assert_eq!(orders(&pipeline, StageId::Ideate), vec![0, 1]);
    assert_eq!(titles(&pipeline, StageId::ToFilm), vec!["B"]);
    assert_eq!(orders(&pipeline, StageId::ToFilm), vec![0]);
}

#[test]
fn schedule_and_unschedule_on_a_day() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = open(&dir);
    let x = pipeline.add_card(StageId::ToSchedule, NewCard::titled("X"));
    let june5 = parse_date("2025-06-05").unwrap();

    assert!(pipeline.schedule_on(&x.id, "2025-06-05").unwrap());
    let on_day: Vec<&str> = pipeline
        .cards_on_date(june5)
        .iter()
        .map(|c| c.id.as_str())
        .collect();
    assert_eq!(on_day, vec![x.id.as_str()]);
    assert_eq!(pipeline.cards().get(&x.id).unwrap().stage, StageId::ToSchedule);

    assert!(pipeline.unschedule(&x.id));
    assert!(pipeline.cards_on_date(june5).is_empty());
    assert_eq!(
        pipeline.cards().get(&x.id).unwrap().scheduling,
        Scheduling::ToSchedule
    );
}

#[test]
fn moving_a_scheduled_card_keeps_its_date() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = open(&dir);
    let x = pipeline.add_card(StageId::ToEdit, NewCard::titled("X"));
    pipeline.schedule_on(&x.id, "2025-06-05").unwrap();

    pipeline.move_card(&x.id, StageId::Posted, 0);

    let card = pipeline.cards().get(&x.id).unwrap();
    assert_eq!(card.stage, StageId::Posted);
    assert_eq!(card.scheduled_date(), Some(parse_date("2025-06-05").unwrap()));
}

#[test]
fn archive_then_search_then_repurpose() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = open(&dir);
    let card = pipeline.add_card(
        StageId::Posted,
        NewCard {
            title: "Thrift Haul".into(),
            hook: Some("Everything under $5".into()),
            script: Some("Lay it all out on the bed".into()),
            ..NewCard::default()
        },
    );

    assert!(pipeline.archive_card(&card.id));
    assert!(
        pipeline
            .cards()
            .stages()
            .iter()
            .all(|s| !s.card_ids.contains(&card.id))
    );
    assert!(pipeline.search("").iter().any(|c| c.id == card.id));
    let archived = pipeline.archive().get(&card.id).unwrap().clone();

    let copy = pipeline.repurpose(&card.id, Some(StageId::Ideate)).unwrap();
    assert_ne!(copy.id, card.id);
    assert_eq!(copy.title, archived.title);
    assert_eq!(copy.hook, archived.hook);
    assert_eq!(copy.script, archived.script);
    assert_eq!(pipeline.archive().get(&card.id), Some(&archived));
    assert_eq!(pipeline.search("thrift").len(), 1);
}

#[test]
fn snapshots_round_trip_without_loss() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = open(&dir);
    let a = pipeline.add_card(StageId::Ideate, NewCard::titled("A"));
    let b = pipeline.add_card(StageId::ToFilm, NewCard::titled("B"));
    let c = pipeline.add_card(StageId::Posted, NewCard::titled("C"));
    pipeline.schedule_on(&b.id, "2025-06-05").unwrap();
    pipeline.set_completed(&c.id, true);
    pipeline.update_card(
        &a.id,
        reel_core::CardPatch {
            platforms: Some(vec!["tiktok".into(), "youtube".into()]),
            ..Default::default()
        },
    );
    pipeline.archive_card(&c.id);

    let backend = FsBackend::new(dir.path());
    let pipeline_doc = snapshot::parse_pipeline(&backend.read(Slot::Pipeline).unwrap().unwrap()).unwrap();
    let archive_doc = snapshot::parse_archive(&backend.read(Slot::Archive).unwrap().unwrap()).unwrap();

    let mut expected = PipelineDoc::capture(pipeline.cards());
    expected.meta = pipeline_doc.meta.clone();
    assert_eq!(pipeline_doc, expected);
    let mut expected = ArchiveDoc::capture(pipeline.archive());
    expected.meta = archive_doc.meta.clone();
    assert_eq!(archive_doc, expected);

    let reopened = open(&dir);
    for stage in StageId::ALL {
        assert_eq!(reopened.cards().stage(stage), pipeline.cards().stage(stage));
    }
    for card in pipeline.cards().cards() {
        assert_eq!(reopened.cards().get(&card.id), Some(card));
    }
    assert_eq!(reopened.archive().get(&c.id), pipeline.archive().get(&c.id));
}

#[test]
fn other_context_sees_writes_after_polling() {
    let dir = TempDir::new().unwrap();
    let mut board_view = open(&dir);
    let mut calendar_view = open(&dir);
    let events = record(&mut calendar_view);

    let card = board_view.add_card(StageId::ToSchedule, NewCard::titled("Launch"));
    board_view.schedule_on(&card.id, "2025-06-05").unwrap();

    assert_eq!(calendar_view.poll_external(), 1);
    let june5 = parse_date("2025-06-05").unwrap();
    assert_eq!(calendar_view.cards_on_date(june5).len(), 1);

    let events = events.borrow();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].origin, Origin::External);
    match &events[0].change {
        Change::PipelineReplaced(doc) => {
            assert_eq!(doc.cards.len(), 1);
            assert_eq!(doc.meta.as_ref().unwrap().writer, board_view.context_id());
        }
        other => panic!("unexpected change {:?}", other),
    }
}

#[test]
fn polling_without_changes_is_quiet() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = open(&dir);
    pipeline.add_card(StageId::Ideate, NewCard::titled("A"));
    assert_eq!(pipeline.poll_external(), 0);
}

#[test]
fn later_full_write_wins() {
    let dir = TempDir::new().unwrap();
    let mut first = open(&dir);
    let mut second = open(&dir);
    let mut observer = open(&dir);

    first.add_card(StageId::Ideate, NewCard::titled("from first"));
    second.add_card(StageId::Ideate, NewCard::titled("from second"));
    second.add_card(StageId::ToEdit, NewCard::titled("also second"));

    observer.poll_external();

    assert_eq!(titles(&observer, StageId::Ideate), vec!["from second"]);
    assert_eq!(titles(&observer, StageId::ToEdit), vec!["also second"]);
    assert_eq!(observer.cards().len(), 2);
    observer.cards().check_invariants().unwrap();
}

#[test]
fn unreadable_external_write_keeps_local_state() {
    let backend = Rc::new(MemBackend::new());
    let mut local = Pipeline::init(Rc::clone(&backend), Config::default());
    local.add_card(StageId::Ideate, NewCard::titled("A"));
    let events = record(&mut local);

    backend.seed(Slot::Pipeline, "{\"version\": 2, \"stages\": [");

    assert_eq!(local.poll_external(), 0);
    assert_eq!(local.cards().len(), 1);
    assert!(matches!(events.borrow()[0].change, Change::Notice(_)));
}

#[test]
fn interrupted_archive_keeps_card_archived() {
    let backend = Rc::new(MemBackend::new());
    let mut pipeline = Pipeline::init(Rc::clone(&backend), Config::default());
    let card = pipeline.add_card(StageId::Posted, NewCard::titled("A"));
    let pipeline_before = backend.read(Slot::Pipeline).unwrap().unwrap();
    pipeline.archive_card(&card.id);

    // Archive slot landed, pipeline slot did not
    backend.seed(Slot::Pipeline, &pipeline_before);

    let reloaded = Pipeline::init(Rc::clone(&backend), Config::default());
    assert!(reloaded.archive().contains(&card.id));
    assert!(!reloaded.cards().contains(&card.id));
    reloaded.cards().check_invariants().unwrap();
}

#[test]
fn open_reads_config_from_data_dir() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("config.toml"),
        "id_prefix = \"vid\"\nrepurpose_stage = \"ideate\"\n",
    )
    .unwrap();

    let mut pipeline = open(&dir);
    let card = pipeline.add_card(StageId::Ideate, NewCard::titled("A"));

    assert!(card.id.starts_with("vid-"));
    assert_eq!(pipeline.config().repurpose_stage, StageId::Ideate);
}

fn pipeline_payloads(events: &[SyncEvent]) -> Vec<Rc<PipelineDoc>> {
    events
        .iter()
        .filter_map(|event| match &event.change {
            Change::PipelineReplaced(doc) => Some(Rc::clone(doc)),
            _ => None,
        })
        .collect()
}

#[test]
fn archive_seen_before_pipeline_write_still_updates_board_views() {
    let backend = Rc::new(MemBackend::new());
    let mut writer = Pipeline::init(Rc::clone(&backend), Config::default());
    let card = writer.add_card(StageId::Posted, NewCard::titled("X"));
    let pipeline_before = backend.read(Slot::Pipeline).unwrap().unwrap();

    let mut reader = Pipeline::init(Rc::clone(&backend), Config::default());
    assert!(reader.cards().contains(&card.id));
    let events = record(&mut reader);

    // Archive slot landed, pipeline slot not yet rewritten
    writer.archive_card(&card.id);
    backend.seed(Slot::Pipeline, &pipeline_before);

    assert_eq!(reader.poll_external(), 1);
    assert!(!reader.cards().contains(&card.id));
    assert!(reader.archive().contains(&card.id));

    let events = events.borrow();
    assert!(events.iter().all(|e| e.origin == Origin::External));
    let payloads = pipeline_payloads(&events);
    assert_eq!(payloads.len(), 1);
    assert!(!payloads[0].cards.contains_key(&card.id));
    assert!(
        payloads[0]
            .stages
            .iter()
            .all(|stage| !stage.card_ids.contains(&card.id))
    );
}

#[test]
fn external_pipeline_payload_drops_cards_already_archived() {
    let backend = Rc::new(MemBackend::new());
    let mut reader = Pipeline::init(Rc::clone(&backend), Config::default());
    let events = record(&mut reader);

    let mut writer = Pipeline::init(Rc::clone(&backend), Config::default());
    let card = writer.add_card(StageId::Posted, NewCard::titled("X"));
    let pipeline_with_card = backend.read(Slot::Pipeline).unwrap().unwrap();
    writer.archive_card(&card.id);
    backend.seed(Slot::Pipeline, &pipeline_with_card);

    assert_eq!(reader.poll_external(), 2);
    assert!(!reader.cards().contains(&card.id));

    let events = events.borrow();
    let payloads = pipeline_payloads(&events);
    assert_eq!(payloads.len(), 1);
    assert!(!payloads[0].cards.contains_key(&card.id));
    assert_eq!(
        payloads[0].meta.as_ref().unwrap().writer,
        writer.context_id()
    );
}
