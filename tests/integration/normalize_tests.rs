//! Integration tests for the normalizer
//!
//! Each test lays out raw tables in a temporary directory and runs a full
//! normalization pass over them.

use crate::common::{create_test_config, event_page, events_listing};
use octagon_harvest::config::PathsConfig;
use octagon_harvest::crawler::{Discoverer, EntityKind};
use octagon_harvest::normalize::{Normalizer, TableName};
use octagon_harvest::storage::{read_url_list, write_url_list};
use octagon_harvest::ScrapeError;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EVENTS: &str = "\
event_name,event_date,event_city,event_state,event_country,event_url
UFC 182: Jones vs. Cormier,2015-01-03,Las Vegas,Nevada,USA,http://ufcstats.com/event-details/e182
UFC 214: Cormier vs. Jones 2,2017-07-29,Anaheim,California,USA,http://ufcstats.com/event-details/e214
UFC 226: Miocic vs. Cormier,2018-07-07,Las Vegas,Nevada,USA,http://ufcstats.com/event-details/e226
";

const FIGHTS: &str = "\
event_name,referee,f_1,f_2,winner,num_rounds,title_fight,weight_class,gender,result,result_details,finish_round,finish_time,fight_url
UFC 182: Jones vs. Cormier,Herb Dean,Jon Jones,Daniel Cormier,Jon Jones,5,T,Light Heavyweight,M,U-DEC,,5,5:00,http://ufcstats.com/fight-details/f1
UFC 214: Cormier vs. Jones 2,John McCarthy,Daniel Cormier,Jon Jones,,5,T,Light Heavyweight,M,Overturned,,3,3:01,http://ufcstats.com/fight-details/f2
UFC 226: Miocic vs. Cormier,Marc Goddard,Stipe Miocic,Daniel Cormier,Daniel Cormier,5,T,Heavyweight,M,KO/TKO,Punch,1,4:33,http://ufcstats.com/fight-details/f3
";

const FIGHT_STATS: &str = "\
fighter_name,knockdowns,total_strikes_att,total_strikes_succ,sig_strikes_att,sig_strikes_succ,takedown_att,takedown_succ,submission_att,reversals,ctrl_time,fight_url
Jon Jones,0,200,142,185,128,3,1,0,0,4:12,http://ufcstats.com/fight-details/f1
Daniel Cormier,0,180,113,160,95,8,3,0,0,2:30,http://ufcstats.com/fight-details/f1
Daniel Cormier,0,90,60,80,50,2,0,0,0,1:05,http://ufcstats.com/fight-details/f2
Jon Jones,1,95,70,88,66,0,0,0,0,0:40,http://ufcstats.com/fight-details/f2
Stipe Miocic,0,30,18,28,16,0,0,0,0,0:00,http://ufcstats.com/fight-details/f3
Daniel Cormier,1,40,28,36,25,0,0,0,0,0:45,http://ufcstats.com/fight-details/f3
";

const FIGHTERS: &str = "\
fighter_f_name,fighter_l_name,fighter_nickname,fighter_height_cm,fighter_weight_lbs,fighter_reach_cm,fighter_stance,fighter_dob,fighter_w,fighter_l,fighter_d,fighter_nc_dq,fighter_url
Jon,Jones,Bones,193.04,248,215.9,Orthodox,1987-07-19,27,1,0,1,http://ufcstats.com/fighter-details/p1
Daniel,Cormier,DC,180.34,251,182.88,Orthodox,1979-03-20,22,3,0,1,http://ufcstats.com/fighter-details/p2
Stipe,Miocic,,193.04,240,203.2,Orthodox,1982-08-19,20,4,0,0,http://ufcstats.com/fighter-details/p3
";

fn write_tables(dir: &Path, tables: [(TableName, &str); 4]) {
    fs::create_dir_all(dir).unwrap();
    for (table, content) in tables {
        fs::write(dir.join(table.file_name()), content).unwrap();
    }
}

fn write_raw(dir: &Path) {
    write_tables(
        dir,
        [
            (TableName::Events, EVENTS),
            (TableName::Fights, FIGHTS),
            (TableName::FightStats, FIGHT_STATS),
            (TableName::Fighters, FIGHTERS),
        ],
    );
}

/// Parses a written table into (header, rows)
fn read_rows(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let header = reader.headers().unwrap().iter().map(String::from).collect();
    let rows = reader
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect();
    (header, rows)
}

fn column(path: &Path, name: &str) -> Vec<String> {
    let (header, rows) = read_rows(path);
    let index = header.iter().position(|h| h == name).unwrap();
    rows.into_iter().map(|mut row| row.swap_remove(index)).collect()
}

fn separate_output(dir: &Path) -> PathsConfig {
    let mut paths = PathsConfig::rooted_at(dir);
    paths.normalized_dir = dir.join("normalized");
    paths
}

#[test]
fn test_output_has_fixed_column_order() {
    let dir = tempfile::tempdir().unwrap();
    let paths = separate_output(dir.path());
    write_raw(&paths.raw_dir);

    let normalizer = Normalizer::new(paths);
    normalizer.run().unwrap();

    let (header, rows) = read_rows(&normalizer.output_path(TableName::Fights));
    assert_eq!(
        header,
        vec![
            "fight_id",
            "event_id",
            "referee",
            "f_1",
            "f_2",
            "winner",
            "num_rounds",
            "title_fight",
            "weight_class",
            "gender",
            "result",
            "result_details",
            "finish_round",
            "finish_time",
            "fight_url"
        ]
    );
    assert_eq!(rows.len(), 3);

    let (header, _) = read_rows(&normalizer.output_path(TableName::Fighters));
    assert_eq!(header[0], "fighter_id");
    assert_eq!(header[1], "fighter_name");
    assert_eq!(
        column(&normalizer.output_path(TableName::Fighters), "fighter_name"),
        vec!["Jon Jones", "Daniel Cormier", "Stipe Miocic"]
    );

    let (header, _) = read_rows(&normalizer.output_path(TableName::FightStats));
    assert_eq!(&header[..3], &["fight_stat_id", "fight_id", "fighter_id"]);
}

#[test]
fn test_events_are_keyed_in_reverse_order() {
    let dir = tempfile::tempdir().unwrap();
    let paths = separate_output(dir.path());
    write_raw(&paths.raw_dir);
    let two_events: String = EVENTS.lines().take(3).map(|l| format!("{}\n", l)).collect();
    fs::write(paths.raw_dir.join(TableName::Events.file_name()), two_events).unwrap();
    // Fights of the dropped event would be rejected; keep the fixture consistent
    let fights: String = FIGHTS.lines().take(3).map(|l| format!("{}\n", l)).collect();
    fs::write(paths.raw_dir.join(TableName::Fights.file_name()), fights).unwrap();

    let normalizer = Normalizer::new(paths);
    let report = normalizer.run().unwrap();

    assert_eq!(
        column(&normalizer.output_path(TableName::Events), "event_id"),
        vec!["2", "1"]
    );
    // Stats of the third fight have no fight to attach to
    assert_eq!(report.rejected(), 2);
}

#[test]
fn test_fighter_names_resolve_to_existing_keys() {
    let dir = tempfile::tempdir().unwrap();
    let paths = separate_output(dir.path());
    write_raw(&paths.raw_dir);
    fs::write(
        paths.raw_dir.join(TableName::Fighters.file_name()),
        "\
fighter_id,fighter_f_name,fighter_l_name,fighter_nickname,fighter_height_cm,fighter_weight_lbs,fighter_reach_cm,fighter_stance,fighter_dob,fighter_w,fighter_l,fighter_d,fighter_nc_dq,fighter_url
5,Jon,Jones,Bones,193.04,248,215.9,Orthodox,1987-07-19,27,1,0,1,http://ufcstats.com/fighter-details/p1
4,Daniel,Cormier,DC,180.34,251,182.88,Orthodox,1979-03-20,22,3,0,1,http://ufcstats.com/fighter-details/p2
3,Stipe,Miocic,,193.04,240,203.2,Orthodox,1982-08-19,20,4,0,0,http://ufcstats.com/fighter-details/p3
",
    )
    .unwrap();

    let normalizer = Normalizer::new(paths);
    let report = normalizer.run().unwrap();
    assert_eq!(report.rejected(), 0);

    let fights = normalizer.output_path(TableName::Fights);
    assert_eq!(column(&fights, "f_1"), vec!["5", "4", "3"]);
    assert_eq!(column(&fights, "f_2"), vec!["4", "5", "4"]);
    assert_eq!(column(&fights, "winner"), vec!["5", "", "4"]);
}

#[test]
fn test_foreign_keys_close_over_written_tables() {
    let dir = tempfile::tempdir().unwrap();
    let paths = separate_output(dir.path());
    write_raw(&paths.raw_dir);
    // One fight with an unknown fighter, one stat row for an unknown fight
    let fights = format!(
        "{}UFC 226: Miocic vs. Cormier,Herb Dean,Stipe Miocic,Francis Ngannou,,5,F,Heavyweight,M,U-DEC,,5,5:00,http://ufcstats.com/fight-details/f4\n",
        FIGHTS
    );
    let stats = format!(
        "{}Jon Jones,0,1,1,1,1,0,0,0,0,0:01,http://ufcstats.com/fight-details/f9\n",
        FIGHT_STATS
    );
    fs::write(paths.raw_dir.join(TableName::Fights.file_name()), fights).unwrap();
    fs::write(paths.raw_dir.join(TableName::FightStats.file_name()), stats).unwrap();

    let normalizer = Normalizer::new(paths);
    let report = normalizer.run().unwrap();
    assert_eq!(report.rejected(), 2);

    let keys = |table: TableName, name: &str| -> HashSet<String> {
        column(&normalizer.output_path(table), name)
            .into_iter()
            .collect()
    };
    let event_keys = keys(TableName::Events, "event_id");
    let fight_keys = keys(TableName::Fights, "fight_id");
    let fighter_keys = keys(TableName::Fighters, "fighter_id");

    assert_eq!(fight_keys.len(), 3);
    assert!(keys(TableName::Fights, "event_id").is_subset(&event_keys));
    assert!(keys(TableName::Fights, "f_1").is_subset(&fighter_keys));
    assert!(keys(TableName::Fights, "f_2").is_subset(&fighter_keys));
    let winners: HashSet<String> = keys(TableName::Fights, "winner")
        .into_iter()
        .filter(|w| !w.is_empty())
        .collect();
    assert!(winners.is_subset(&fighter_keys));
    assert!(keys(TableName::FightStats, "fight_id").is_subset(&fight_keys));
    assert!(keys(TableName::FightStats, "fighter_id").is_subset(&fighter_keys));
}

#[test]
fn test_second_run_over_own_output_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let paths = PathsConfig::rooted_at(dir.path());
    assert_eq!(paths.raw_dir, paths.normalized_dir);
    write_raw(&paths.raw_dir);

    let normalizer = Normalizer::new(paths);
    normalizer.run().unwrap();
    let snapshot = |n: &Normalizer| -> Vec<String> {
        TableName::ALL
            .iter()
            .map(|t| fs::read_to_string(n.output_path(*t)).unwrap())
            .collect()
    };
    let first = snapshot(&normalizer);

    let report = normalizer.run().unwrap();
    assert_eq!(report.fresh_keys, 0);
    assert_eq!(snapshot(&normalizer), first);
}

#[test]
fn test_missing_fight_table_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let paths = separate_output(dir.path());
    write_raw(&paths.raw_dir);
    fs::remove_file(paths.raw_dir.join(TableName::Fights.file_name())).unwrap();

    let normalizer = Normalizer::new(paths.clone());
    match normalizer.run() {
        Err(ScrapeError::MissingInput { path }) => {
            assert_eq!(path, paths.raw_dir.join("ufc_fight_data.csv"));
        }
        other => panic!("expected a missing input error, got {:?}", other.map(|_| ())),
    }
    assert!(!paths.normalized_dir.exists());
}

#[test]
fn test_missing_table_keeps_previous_output() {
    let dir = tempfile::tempdir().unwrap();
    let paths = separate_output(dir.path());
    write_raw(&paths.raw_dir);
    let normalizer = Normalizer::new(paths.clone());
    normalizer.run().unwrap();
    let before = fs::read_to_string(normalizer.output_path(TableName::Events)).unwrap();

    fs::remove_file(paths.raw_dir.join(TableName::FightStats.file_name())).unwrap();
    assert!(normalizer.run().is_err());

    let after = fs::read_to_string(normalizer.output_path(TableName::Events)).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_appended_raw_rows_keep_earlier_keys() {
    let dir = tempfile::tempdir().unwrap();
    let paths = PathsConfig::rooted_at(dir.path());
    write_raw(&paths.raw_dir);
    let normalizer = Normalizer::new(paths.clone());
    normalizer.run().unwrap();

    let fighters = normalizer.output_path(TableName::Fighters);
    let before = column(&fighters, "fighter_id");

    // A later scrape appends a fighter with no key yet
    let mut text = fs::read_to_string(&fighters).unwrap();
    text.push_str(
        ",Francis Ngannou,The Predator,193.04,257,210.82,Orthodox,1986-09-05,17,3,0,0,http://ufcstats.com/fighter-details/p4\n",
    );
    fs::write(&fighters, text).unwrap();
    normalizer.run().unwrap();

    let after = column(&fighters, "fighter_id");
    assert_eq!(&after[..3], &before[..]);
    assert_eq!(after[3], "4");
}

#[tokio::test]
async fn test_normalized_events_feed_discovery_exclusions() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    Mock::given(method("GET"))
        .and(path("/statistics/events/completed"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(events_listing("http://ufcstats.com", &["e182", "e214", "e300"])),
        )
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&base_url, dir.path());
    write_raw(&config.paths.raw_dir);
    Normalizer::from_config(&config).run().unwrap();

    let discoverer = Discoverer::new(config).unwrap();
    let report = discoverer.discover(EntityKind::Event).await.unwrap();

    assert_eq!(report.found, 3);
    assert_eq!(
        read_url_list(&discoverer.url_list_path(EntityKind::Event)).unwrap(),
        vec!["http://ufcstats.com/event-details/e300".to_string()]
    );
}

#[tokio::test]
async fn test_parked_fights_are_not_rediscovered() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    Mock::given(method("GET"))
        .and(path("/event-details/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(event_page("http://ufcstats.com", &["f1", "f4", "f5"])),
        )
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&base_url, dir.path());
    write_raw(&config.paths.raw_dir);
    let fights = format!(
        "{}UFC 226: Miocic vs. Cormier,Herb Dean,Stipe Miocic,Francis Ngannou,,5,F,Heavyweight,M,U-DEC,,5,5:00,http://ufcstats.com/fight-details/f4\n",
        FIGHTS
    );
    fs::write(config.paths.raw_dir.join(TableName::Fights.file_name()), fights).unwrap();

    // Normalizing in place leaves f4 out of the fight table
    let normalizer = Normalizer::from_config(&config);
    let report = normalizer.run().unwrap();
    assert_eq!(report.rejected(), 1);
    let fight_urls = column(&normalizer.output_path(TableName::Fights), "fight_url");
    assert!(!fight_urls.contains(&"http://ufcstats.com/fight-details/f4".to_string()));
    assert_eq!(
        column(&normalizer.parked_path(TableName::Fights), "fight_url"),
        vec!["http://ufcstats.com/fight-details/f4"]
    );

    let discoverer = Discoverer::new(config).unwrap();
    write_url_list(
        &discoverer.url_list_path(EntityKind::Event),
        &[format!("{}/event-details/1", base_url)],
    )
    .unwrap();
    let report = discoverer.discover_fights().await.unwrap();

    assert_eq!(report.found, 3);
    assert_eq!(
        read_url_list(&discoverer.url_list_path(EntityKind::Fight)).unwrap(),
        vec!["http://ufcstats.com/fight-details/f5".to_string()]
    );
}
