use std::collections::BTreeMap;
use std::error::Error;
use std::io;

use serde::Deserialize;

// Input schema of the history dump. Older dumps use `firstWord`,
// `sessionPid` and `realtimeBeforeLocal`; accepted as aliases.
#[derive(Debug, Clone, Deserialize)]
pub struct Record {
    #[serde(rename = "cmdLine", default)]
    pub cmd_line: String,
    #[serde(rename = "command", alias = "firstWord", default)]
    pub command: String,
    #[serde(rename = "realtimeAfterLocal", alias = "realtimeBeforeLocal", default)]
    pub realtime: f64,
    #[serde(rename = "seqSessionId", alias = "sessionPid", default)]
    pub session_id: u64,
    #[serde(default)]
    pub invalid: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchOutcome {
    #[serde(rename = "Match", default)]
    pub matched: bool,
    #[serde(rename = "Distance", default)]
    pub distance: usize,
    #[serde(rename = "CharsRecalled", default)]
    pub chars_recalled: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrefixMatch {
    #[serde(rename = "Match", default)]
    pub matched: bool,
    #[serde(rename = "Entries", default)]
    pub entries: Vec<MatchOutcome>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Strategy {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Matches", default)]
    pub matches: Vec<MatchOutcome>,
    #[serde(rename = "PrefixMatches", default)]
    pub prefix_matches: Vec<PrefixMatch>,
}

#[derive(Debug, Deserialize)]
pub struct DeviceRecords {
    #[serde(rename = "Records", default)]
    pub records: Option<Vec<Record>>,
}

#[derive(Debug, Deserialize)]
pub struct UserRecords {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Devices", default)]
    pub devices: Option<Vec<DeviceRecords>>,
}

#[derive(Debug, Deserialize)]
pub struct Dump {
    #[serde(rename = "UsersRecords", default)]
    pub users_records: Option<Vec<UserRecords>>,
    #[serde(rename = "Records", default)]
    pub records: Option<Vec<Record>>,
    #[serde(rename = "Strategies", default)]
    pub strategies: Option<Vec<Strategy>>,
}

pub fn read_dump(reader: impl io::Read) -> Result<Dump, Box<dyn Error>> {
    let dump = serde_json::from_reader(reader)?;
    Ok(dump)
}

// Loaded view of the dump: records flattened and sorted by timestamp,
// plus the per-session and per-user groupings every analysis works from.
#[derive(Debug)]
pub struct History {
    pub records: Vec<Record>,
    pub by_session: BTreeMap<u64, Vec<Record>>,
    pub by_user: Vec<(String, Vec<Record>)>,
}

fn add(
    record: &Record,
    user_records: &mut Vec<Record>,
    records: &mut Vec<Record>,
    by_session: &mut BTreeMap<u64, Vec<Record>>,
) {
    if record.invalid {
        return;
    }
    records.push(record.clone());
    by_session
        .entry(record.session_id)
        .or_insert_with(Vec::new)
        .push(record.clone());
    user_records.push(record.clone());
}

impl History {
    pub fn from_dump(dump: &Dump) -> History {
        let mut records = Vec::new();
        let mut by_session: BTreeMap<u64, Vec<Record>> = BTreeMap::new();
        let mut by_user: Vec<(String, Vec<Record>)> = Vec::new();

        if let Some(users) = &dump.users_records {
            for user in users {
                let mut user_records = Vec::new();
                if let Some(devices) = &user.devices {
                    for device in devices {
                        if let Some(device_records) = &device.records {
                            for record in device_records {
                                add(record, &mut user_records, &mut records, &mut by_session);
                            }
                        }
                    }
                }
                by_user.push((user.name.clone(), user_records));
            }
        } else if let Some(flat) = &dump.records {
            // flat dumps carry no user grouping
            let mut user_records = Vec::new();
            for record in flat {
                add(record, &mut user_records, &mut records, &mut by_session);
            }
            by_user.push(("all".to_string(), user_records));
        }

        records.sort_by(|a, b| a.realtime.total_cmp(&b.realtime));
        for session in by_session.values_mut() {
            session.sort_by(|a, b| a.realtime.total_cmp(&b.realtime));
        }
        for (_, user_records) in by_user.iter_mut() {
            user_records.sort_by(|a, b| a.realtime.total_cmp(&b.realtime));
        }

        History {
            records,
            by_session,
            by_user,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NESTED_DUMP: &str = r#"{
        "UsersRecords": [
            {
                "Name": "alice",
                "Devices": [
                    {
                        "Name": "laptop",
                        "Records": [
                            {"cmdLine": "ls -la", "command": "ls", "realtimeAfterLocal": 30.0, "seqSessionId": 1},
                            {"cmdLine": "cd /tmp", "command": "cd", "realtimeAfterLocal": 10.0, "seqSessionId": 1},
                            {"cmdLine": "oops", "command": "oops", "realtimeAfterLocal": 20.0, "seqSessionId": 1, "invalid": true}
                        ]
                    },
                    {"Name": "empty", "Records": null}
                ]
            },
            {
                "Name": "bob",
                "Devices": [
                    {
                        "Name": "desktop",
                        "Records": [
                            {"cmdLine": "make", "firstWord": "make", "realtimeBeforeLocal": 5.0, "sessionPid": 7}
                        ]
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn nested_dump_is_flattened_and_sorted() {
        let dump = read_dump(NESTED_DUMP.as_bytes()).unwrap();
        let history = History::from_dump(&dump);

        // invalid record dropped, rest sorted ascending by timestamp
        assert_eq!(history.records.len(), 3);
        assert_eq!(history.records[0].command, "make");
        assert_eq!(history.records[1].command, "cd");
        assert_eq!(history.records[2].command, "ls");

        let session = &history.by_session[&1];
        assert_eq!(session.len(), 2);
        assert_eq!(session[0].command, "cd");
        assert_eq!(session[1].command, "ls");

        assert_eq!(history.by_user.len(), 2);
        assert_eq!(history.by_user[0].0, "alice");
        assert_eq!(history.by_user[0].1.len(), 2);
        assert_eq!(history.by_user[0].1[0].command, "cd");
        assert_eq!(history.by_user[1].0, "bob");
        assert_eq!(history.by_user[1].1.len(), 1);
    }

    #[test]
    fn old_field_names_are_accepted() {
        let dump = read_dump(NESTED_DUMP.as_bytes()).unwrap();
        let history = History::from_dump(&dump);
        let bob = &history.by_user[1].1[0];
        assert_eq!(bob.command, "make");
        assert_eq!(bob.session_id, 7);
        assert_eq!(bob.realtime, 5.0);
    }

    #[test]
    fn flat_dump_gets_a_synthetic_user() {
        let input = r#"{
            "Records": [
                {"cmdLine": "ls", "command": "ls", "realtimeAfterLocal": 1.0, "seqSessionId": 3}
            ]
        }"#;
        let dump = read_dump(input.as_bytes()).unwrap();
        let history = History::from_dump(&dump);
        assert_eq!(history.by_user.len(), 1);
        assert_eq!(history.by_user[0].0, "all");
        assert_eq!(history.records.len(), 1);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(read_dump("{not json".as_bytes()).is_err());
    }

    #[test]
    fn strategies_parse() {
        let input = r#"{
            "Records": [],
            "Strategies": [
                {
                    "Title": "recent",
                    "Matches": [{"Match": true, "Distance": 1, "CharsRecalled": 5}],
                    "PrefixMatches": [
                        {"Match": true, "Entries": [
                            {"Match": true, "Distance": 1, "CharsRecalled": 2},
                            {"Match": true, "Distance": 4, "CharsRecalled": 6}
                        ]}
                    ]
                }
            ]
        }"#;
        let dump = read_dump(input.as_bytes()).unwrap();
        let strategies = dump.strategies.unwrap();
        assert_eq!(strategies[0].title, "recent");
        assert_eq!(strategies[0].matches.len(), 1);
        assert_eq!(strategies[0].prefix_matches[0].entries.len(), 2);
    }
}
