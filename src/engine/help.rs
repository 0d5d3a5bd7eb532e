/// Help topics in display order.
const TOPICS: &[(&str, &str)] = &[
    (
        "peer",
        "peer connect <host>:<port>\npeer list\npeer remove <key>\npeer id",
    ),
    (
        "client",
        "client list\nclient setname <name>\nclient getname\nclient kill <ip>:<port>",
    ),
    (
        "scan",
        "scan <cursor> [match <pattern>] [count <n>] [type <type>]",
    ),
    ("info", "info [server|keyspace|vql|wal|replication]"),
];

/// Help text for `topic`, or every topic when it is empty or unknown.
pub fn help(topic: &str) -> String {
    let topic = topic.to_ascii_lowercase();
    if let Some((_, text)) = TOPICS.iter().find(|(name, _)| *name == topic) {
        return text.to_string();
    }
    TOPICS
        .iter()
        .map(|(_, text)| *text)
        .collect::<Vec<_>>()
        .join("\n")
}
