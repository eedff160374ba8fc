//! End-to-end pipeline tests over the in-memory backends: synthetic
//! replay bytes in, persisted battle records and render jobs out.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use wows_replay_ingest::assembler::compute_match_key;
use wows_replay_ingest::persister::{record_counts, Persister};
use wows_replay_ingest::pipeline::{IngestPipeline, RenderJob};
use wows_replay_ingest::query::{QueryGateway, SearchFilters};
use wows_replay_ingest::records::GameType;
use wows_replay_ingest::store::memory::{
    MemoryBattleStore, MemoryObjectStore, MemorySearchIndexStore,
};
use wows_replay_ingest::store::{replay_key, BattleStore, ObjectStore, SearchIndexStore};
use wows_replay_parser::stats::ship_params::ShipParams;
use wows_replay_parser::testkit::ReplayBuilder;
use wows_replay_parser::types::{Team, WinLoss};

struct TestEnv {
    store: Arc<MemoryBattleStore>,
    index: Arc<MemorySearchIndexStore>,
    objects: Arc<MemoryObjectStore>,
    pipeline: IngestPipeline,
    persister: Arc<Persister>,
    render_rx: mpsc::Receiver<RenderJob>,
    query: QueryGateway,
}

fn test_env() -> TestEnv {
    let store = Arc::new(MemoryBattleStore::new());
    let index = Arc::new(MemorySearchIndexStore::new());
    let objects = Arc::new(MemoryObjectStore::new());

    let store_dyn: Arc<dyn BattleStore> = store.clone();
    let index_dyn: Arc<dyn SearchIndexStore> = index.clone();
    let objects_dyn: Arc<dyn ObjectStore> = objects.clone();

    let persister = Arc::new(Persister::new(store_dyn.clone(), index_dyn.clone()));
    let (render_tx, render_rx) = mpsc::channel(16);
    let pipeline = IngestPipeline::new(
        Arc::new(ShipParams::bundled()),
        persister.clone(),
        objects_dyn.clone(),
        render_tx,
    );
    let query = QueryGateway::new(store_dyn, index_dyn, objects_dyn, 900);

    TestEnv {
        store,
        index,
        objects,
        pipeline,
        persister,
        render_rx,
        query,
    }
}

async fn ingest(env: &TestEnv, uploader: &str, file_name: &str, bytes: Vec<u8>) -> String {
    let key = replay_key(uploader, file_name);
    env.objects
        .put(&key, bytes, "application/octet-stream")
        .await
        .unwrap();
    env.pipeline.handle_object_created(&key).await.unwrap();
    key
}

#[tokio::test]
async fn clan_battle_single_upload_ally_wins() {
    let mut env = test_env();
    let bytes = ReplayBuilder::clan_battle().build();
    ingest(
        &env,
        "discord-1111",
        "20260103_232822_PZSD109-Chung-Mu_19_OC_prey.wowsreplay",
        bytes,
    )
    .await;

    let record = env
        .store
        .get_match(GameType::Clan, "7700000001")
        .await
        .unwrap()
        .expect("match record in the clan table");

    assert_eq!(record.win_loss, WinLoss::Win);
    assert_eq!(record.map_id, "spaces/19_OC_prey");
    assert_eq!(record.ally_main_clan_tag, "OZEKI");
    assert_eq!(record.enemy_main_clan_tag, "KNAVE");
    assert_eq!(record.allies.len(), 7);
    assert_eq!(record.enemies.len(), 7);
    assert_eq!(record.uploaders.len(), 1);
    assert!(!record.has_dual_replay);
    assert_eq!(record.date_time_sortable, "20260103232822");
    assert_eq!(record.date_time_sortable.len(), 14);
    assert_eq!(record.ally_perspective_player_name, "_meteor0090");

    // The grouping key is recomputable from the record's own fields.
    let names: Vec<String> = record
        .allies
        .iter()
        .chain(record.enemies.iter())
        .map(|p| p.name.clone())
        .collect();
    assert_eq!(
        record.match_key,
        compute_match_key(&record.date_time, &record.map_id, record.game_type, &names)
    );

    let stats = env
        .store
        .get_stats(GameType::Clan, "7700000001")
        .await
        .unwrap()
        .expect("stats record");
    assert_eq!(stats.all_players_stats.len(), 14);
    let own = stats
        .all_players_stats
        .iter()
        .find(|s| s.is_own)
        .expect("own player row");
    assert_eq!(own.player_name, "_meteor0090");
    assert_eq!(own.ship_name, "Chung Mu");
    assert_eq!(own.damage_component_sum(), own.damage);

    // One ship-index row per distinct ship name across both teams.
    let distinct_ships: HashSet<String> = record
        .allies
        .iter()
        .chain(record.enemies.iter())
        .map(|p| p.ship_name.to_uppercase())
        .collect();
    assert_eq!(env.index.ship_row_count(), distinct_ships.len());
    assert_eq!(env.index.player_row_count(), 14);
    assert_eq!(env.index.clan_row_count(), 2);

    // First upload schedules exactly one single render.
    let job = env.render_rx.try_recv().unwrap();
    assert!(!job.dual);
    assert_eq!(job.arena_unique_id, "7700000001");
    assert!(env.render_rx.try_recv().is_err());
}

#[tokio::test]
async fn replay_without_any_arena_id_is_marked_failed() {
    let env = test_env();
    // Neither a map packet nor battle statistics: nothing identifies the
    // battle, so a failure marker is written instead of a MATCH row.
    let bytes = ReplayBuilder::clan_battle()
        .without_battle_stats()
        .without_map_packet()
        .build();
    let key = replay_key("discord-1111", "left_early.wowsreplay");
    env.objects
        .put(&key, bytes, "application/octet-stream")
        .await
        .unwrap();
    let err = env.pipeline.handle_object_created(&key).await.unwrap_err();
    assert_eq!(err.kind(), "NoArenaId");

    let failures = env.store.decode_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].upload_key, key);
}

#[tokio::test]
async fn incomplete_replay_with_map_packet_still_searchable() {
    let mut env = test_env();
    // The map packet carries the arena id, so a battle abandoned before
    // the terminal statistics packet still groups correctly.
    let bytes = ReplayBuilder::clan_battle()
        .without_battle_stats()
        .arena_id(7_700_000_099)
        .build();
    ingest(&env, "discord-1111", "left_at_0312.wowsreplay", bytes).await;

    let record = env
        .store
        .get_match(GameType::Clan, "7700000099")
        .await
        .unwrap()
        .expect("match record");
    assert_eq!(record.win_loss, WinLoss::Unknown);

    let stats = env.store.get_stats(GameType::Clan, "7700000099").await.unwrap();
    assert!(stats.is_none());

    // Search by map still returns the battle.
    let found = env
        .query
        .search(&SearchFilters {
            game_type: Some(GameType::Clan),
            map_id: Some("spaces/19_OC_prey".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(found.count, 1);

    // Metadata-only battles still get a video.
    let job = env.render_rx.try_recv().unwrap();
    assert!(!job.dual);
}

#[tokio::test]
async fn dual_upload_collapses_to_one_match() {
    let mut env = test_env();

    let ally_side = ReplayBuilder::clan_battle();
    ingest(&env, "discord-1111", "ally.wowsreplay", ally_side.build()).await;

    // The opposing team's recorder submits sixty seconds later.
    let enemy_side = ReplayBuilder::clan_battle().recorded_by("kn_daring");
    ingest(&env, "discord-2222", "enemy.wowsreplay", enemy_side.build()).await;

    let record = env
        .store
        .get_match(GameType::Clan, "7700000001")
        .await
        .unwrap()
        .unwrap();
    assert!(record.has_dual_replay);
    assert_eq!(record.uploaders.len(), 2);
    // The perspective pin belongs to the first uploader.
    assert_eq!(record.ally_perspective_player_name, "_meteor0090");
    assert_eq!(record.win_loss, WinLoss::Win);

    let teams: HashSet<Team> = record.uploaders.iter().map(|u| u.team).collect();
    assert!(teams.contains(&Team::Ally) && teams.contains(&Team::Enemy));

    // MATCH + STATS + two UPLOAD records, nothing duplicated.
    let (matches, stats, uploads) =
        record_counts(&*env.store, GameType::Clan, "7700000001").await.unwrap();
    assert_eq!((matches, stats, uploads), (1, 1, 2));
    assert_eq!(record.uploaders.len(), uploads);

    let uploads = env.store.get_uploads(GameType::Clan, "7700000001").await.unwrap();
    let upload_teams: HashSet<Team> = uploads.iter().map(|u| u.team).collect();
    assert!(upload_teams.contains(&Team::Ally) && upload_teams.contains(&Team::Enemy));

    // One single render for the first upload, one dual render when the
    // opposite side arrived, nothing else.
    let first = env.render_rx.try_recv().unwrap();
    assert!(!first.dual);
    let second = env.render_rx.try_recv().unwrap();
    assert!(second.dual);
    assert!(env.render_rx.try_recv().is_err());

    // Index rows were written once, by the first upload.
    assert_eq!(env.index.clan_row_count(), 2);
}

#[tokio::test]
async fn same_player_reupload_is_idempotent() {
    let mut env = test_env();
    let bytes = ReplayBuilder::clan_battle().build();
    ingest(&env, "discord-1111", "battle.wowsreplay", bytes.clone()).await;
    let first = env
        .store
        .get_match(GameType::Clan, "7700000001")
        .await
        .unwrap()
        .unwrap();

    ingest(&env, "discord-1111", "battle.wowsreplay", bytes).await;
    let second = env
        .store
        .get_match(GameType::Clan, "7700000001")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(second.uploaders.len(), 1);
    assert_eq!(second.revision, first.revision);
    assert!(!second.has_dual_replay);

    let (matches, stats, uploads) =
        record_counts(&*env.store, GameType::Clan, "7700000001").await.unwrap();
    assert_eq!((matches, stats, uploads), (1, 1, 1));

    // Only the initial upload scheduled a render.
    assert!(env.render_rx.try_recv().is_ok());
    assert!(env.render_rx.try_recv().is_err());
}

#[tokio::test]
async fn win_loss_falls_back_to_clan_xp() {
    let env = test_env();

    let winner = ReplayBuilder::clan_battle()
        .winner(None)
        .raw_xp(300_000)
        .arena_id(7_700_000_301)
        .build();
    ingest(&env, "discord-1111", "w.wowsreplay", winner).await;
    let record = env
        .store
        .get_match(GameType::Clan, "7700000301")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.win_loss, WinLoss::Win);

    let loser = ReplayBuilder::clan_battle()
        .winner(None)
        .raw_xp(150_000)
        .arena_id(7_700_000_302)
        .build();
    ingest(&env, "discord-1111", "l.wowsreplay", loser).await;
    let record = env
        .store
        .get_match(GameType::Clan, "7700000302")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.win_loss, WinLoss::Loss);
}

#[tokio::test]
async fn draw_comes_from_battle_result() {
    let env = test_env();
    let bytes = ReplayBuilder::clan_battle()
        .winner(Some(-1))
        .arena_id(7_700_000_303)
        .build();
    ingest(&env, "discord-1111", "d.wowsreplay", bytes).await;
    let record = env
        .store
        .get_match(GameType::Clan, "7700000303")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.win_loss, WinLoss::Draw);
}

#[tokio::test]
async fn undecodable_upload_leaves_a_failure_marker() {
    let env = test_env();
    let key = replay_key("discord-1111", "garbage.wowsreplay");
    env.objects
        .put(&key, vec![0xDE, 0xAD, 0xBE, 0xEF], "application/octet-stream")
        .await
        .unwrap();

    let err = env.pipeline.handle_object_created(&key).await.unwrap_err();
    assert_eq!(err.kind(), "MalformedHeader");

    let failures = env.store.decode_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].error_kind, "MalformedHeader");

    // Nothing landed in any battle table.
    for gt in GameType::ALL {
        assert!(env
            .store
            .list_matches(gt, &Default::default())
            .await
            .unwrap()
            .is_empty());
    }
}

#[tokio::test]
async fn unsupported_version_is_rejected_with_kind() {
    let env = test_env();
    let bytes = ReplayBuilder::clan_battle()
        .client_version("13,5,0,1")
        .build();
    let key = replay_key("discord-1111", "old.wowsreplay");
    env.objects
        .put(&key, bytes, "application/octet-stream")
        .await
        .unwrap();

    let err = env.pipeline.handle_object_created(&key).await.unwrap_err();
    assert_eq!(err.kind(), "UnsupportedVersion");
}

#[tokio::test]
async fn search_sorts_across_year_boundary_and_filters() {
    let env = test_env();

    let december = ReplayBuilder::clan_battle()
        .date_time("31.12.2025 23:59:00")
        .arena_id(7_700_000_401)
        .build();
    ingest(&env, "discord-1111", "dec.wowsreplay", december).await;

    let january = ReplayBuilder::clan_battle()
        .date_time("01.01.2026 00:01:00")
        .arena_id(7_700_000_402)
        .build();
    ingest(&env, "discord-1111", "jan.wowsreplay", january).await;

    let response = env
        .query
        .search(&SearchFilters {
            game_type: Some(GameType::Clan),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(response.count, 2);
    // Newest first: the 2026 battle leads even though the raw string
    // "31.12.2025" compares above "01.01.2026".
    assert_eq!(response.items[0].arena_unique_id, "7700000402");
    assert_eq!(response.items[1].arena_unique_id, "7700000401");
    assert!(response.items[0].date_time_sortable > response.items[1].date_time_sortable);

    // Ship index filter, case-insensitive input.
    let by_ship = env
        .query
        .search(&SearchFilters {
            ship_name: Some("chung mu".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_ship.count, 2);

    // Player filter narrows to matches that player appeared in.
    let by_player = env
        .query
        .search(&SearchFilters {
            player_name: Some("kn_daring".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_player.count, 2);
    let nobody = env
        .query
        .search(&SearchFilters {
            player_name: Some("not_in_any_battle".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(nobody.count, 0);

    // Date range lowers onto unixTime.
    let only_2026 = env
        .query
        .search(&SearchFilters {
            date_from: Some("2026-01-01".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(only_2026.count, 1);
    assert_eq!(only_2026.items[0].arena_unique_id, "7700000402");

    // Clan + win/loss post predicates.
    let wins_vs_knave = env
        .query
        .search(&SearchFilters {
            enemy_clan_tag: Some("KNAVE".into()),
            win_loss: Some(WinLoss::Win),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(wins_vs_knave.count, 2);
}

#[tokio::test]
async fn search_pagination_cursor_walks_backwards() {
    let env = test_env();
    for (i, hour) in ["10", "11", "12"].iter().enumerate() {
        let bytes = ReplayBuilder::clan_battle()
            .date_time(&format!("05.01.2026 {hour}:00:00"))
            .arena_id(7_700_000_500 + i as i64)
            .build();
        ingest(&env, "discord-1111", &format!("p{i}.wowsreplay"), bytes).await;
    }

    let first_page = env
        .query
        .search(&SearchFilters {
            game_type: Some(GameType::Clan),
            limit: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(first_page.count, 2);
    assert!(first_page.has_more);
    let cursor = first_page.cursor_unix_time.unwrap();

    let second_page = env
        .query
        .search(&SearchFilters {
            game_type: Some(GameType::Clan),
            limit: Some(2),
            cursor_unix_time: Some(cursor),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(second_page.count, 1);
    assert!(!second_page.has_more);
    assert!(second_page.items[0].unix_time < cursor);
}

#[tokio::test]
async fn match_detail_joins_all_record_kinds() {
    let env = test_env();
    ingest(
        &env,
        "discord-1111",
        "a.wowsreplay",
        ReplayBuilder::clan_battle().build(),
    )
    .await;
    ingest(
        &env,
        "discord-2222",
        "b.wowsreplay",
        ReplayBuilder::clan_battle().recorded_by("kn_daring").build(),
    )
    .await;

    let detail = env
        .query
        .match_detail("7700000001")
        .await
        .unwrap()
        .expect("detail");
    assert_eq!(detail.match_record.arena_unique_id, "7700000001");
    assert_eq!(detail.stats.unwrap().all_players_stats.len(), 14);
    assert_eq!(detail.uploads.len(), 2);
    // No render ran in this test, so no presigned URLs yet.
    assert!(detail.video_url.is_none());

    assert!(env.query.match_detail("nonexistent").await.unwrap().is_none());
}

#[tokio::test]
async fn reindex_backfill_is_idempotent() {
    let env = test_env();
    ingest(
        &env,
        "discord-1111",
        "a.wowsreplay",
        ReplayBuilder::clan_battle().build(),
    )
    .await;

    let ships_before = env.index.ship_row_count();
    let players_before = env.index.player_row_count();
    let clans_before = env.index.clan_row_count();

    let reindexed = env.persister.reindex(GameType::Clan).await.unwrap();
    assert_eq!(reindexed, 1);

    // Rows are keyed upserts: the backfill converges, never duplicates.
    assert_eq!(env.index.ship_row_count(), ships_before);
    assert_eq!(env.index.player_row_count(), players_before);
    assert_eq!(env.index.clan_row_count(), clans_before);
}

#[tokio::test]
async fn matchkey_flags_same_battle_across_diverged_arena_ids() {
    let env = test_env();
    // Synthetic corruption: the same server battle surfaces under two
    // arena ids, with uploader clocks 45 seconds apart.
    let a = ReplayBuilder::clan_battle()
        .date_time("04.01.2026 21:56:10")
        .arena_id(7_700_000_601)
        .build();
    let b = ReplayBuilder::clan_battle()
        .recorded_by("kn_daring")
        .date_time("04.01.2026 21:56:55")
        .arena_id(7_700_000_602)
        .build();
    ingest(&env, "discord-1111", "a.wowsreplay", a).await;
    ingest(&env, "discord-2222", "b.wowsreplay", b).await;

    let first = env
        .store
        .get_match(GameType::Clan, "7700000601")
        .await
        .unwrap()
        .unwrap();
    let second = env
        .store
        .get_match(GameType::Clan, "7700000602")
        .await
        .unwrap()
        .unwrap();
    // Two MATCH rows exist, but the grouping key exposes the duplicate.
    assert_eq!(first.match_key, second.match_key);
}
