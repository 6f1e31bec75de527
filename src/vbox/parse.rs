//! Parsers for the two text shapes VBoxManage prints
//!
//! `list --long <kind>` prints records separated by a blank line, one
//! `Key:   Value` pair per line. `showvminfo --machinereadable` prints one
//! `key=value` (or `"key"="value"`) pair per line with no record separator.
//! Both end up as a string-keyed map handed to the entity decoders.

use std::collections::BTreeMap;

/// One decoded record of tool output.
pub type Record = BTreeMap<String, String>;

/// Splits `list --long` output into records.
///
/// Values keep everything after the first colon, so `Location: C:\disk.vdi`
/// and MAC addresses survive intact.
pub fn parse_long_list(output: &str) -> Vec<Record> {
    let mut records = Vec::new();
    let mut current = Record::new();

    for line in output.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                records.push(std::mem::take(&mut current));
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            current.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    if !current.is_empty() {
        records.push(current);
    }
    records
}

/// Parses `--machinereadable` output into a single record.
pub fn parse_machine_readable(output: &str) -> Record {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (unquote(key.trim()).to_string(), unquote(value.trim()).to_string()))
        .collect()
}

fn unquote(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Largest `N` among keys shaped `<prefix>N`, if any.
///
/// Indexed collections are sized by what the tool reports, not by a fixed
/// slot count.
pub fn max_index(record: &Record, prefix: &str) -> Option<u32> {
    record
        .keys()
        .filter_map(|key| key.strip_prefix(prefix))
        .filter(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|suffix| suffix.parse().ok())
        .max()
}

/// `"on"` is true, anything else is false.
pub fn flag(record: &Record, key: &str) -> Option<bool> {
    record.get(key).map(|v| v == "on")
}

/// Integer value of `key`, ignoring values that do not parse.
pub fn number(record: &Record, key: &str) -> Option<u32> {
    record.get(key).and_then(|v| v.trim().parse().ok())
}

/// Encodes a boolean the way VBoxManage expects it.
pub fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOSTIFS: &str = "\
Name:            en0: Ethernet
GUID:            00306e65-0000-4000-8000-3c0754471e4a
DHCP:            Disabled
IPAddress:       192.168.1.20
NetworkMask:     255.255.255.0
HardwareAddress: 3c:07:54:47:1e:4a

Name:            vboxnet0
IPAddress:       192.168.56.1
NetworkMask:     255.255.255.0
HardwareAddress: 0a:00:27:00:00:00
";

    #[test]
    fn splits_records_on_blank_lines() {
        let records = parse_long_list(HOSTIFS);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["Name"], "vboxnet0");
        assert_eq!(records[1]["IPAddress"], "192.168.56.1");
    }

    #[test]
    fn splits_on_first_colon_only() {
        let records = parse_long_list(HOSTIFS);
        assert_eq!(records[0]["Name"], "en0: Ethernet");
        assert_eq!(records[0]["HardwareAddress"], "3c:07:54:47:1e:4a");
    }

    #[test]
    fn tolerates_extra_blank_lines_and_crlf() {
        let output = "\r\n\r\nID: Linux26\r\nDescription: Linux 2.6\r\n\r\n\r\nID: Other\r\n";
        let records = parse_long_list(output);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["Description"], "Linux 2.6");
        assert_eq!(records[1]["ID"], "Other");
    }

    #[test]
    fn machine_readable_strips_quotes() {
        let output = "name=\"vbx_1\"\nmemory=512\n\"SATA Controller-0-0\"=\"/tmp/a=b.vdi\"\nbroken line\n";
        let record = parse_machine_readable(output);
        assert_eq!(record["name"], "vbx_1");
        assert_eq!(record["memory"], "512");
        assert_eq!(record["SATA Controller-0-0"], "/tmp/a=b.vdi");
        assert_eq!(record.len(), 3);
    }

    #[test]
    fn max_index_scans_all_keys() {
        let record = parse_machine_readable("nic1=nat\nnic8=none\nnictype1=Am79C973\nnic3=null\n");
        assert_eq!(max_index(&record, "nic"), Some(8));
        assert_eq!(max_index(&record, "storagecontrollername"), None);
    }

    #[test]
    fn scalar_helpers() {
        let record = parse_machine_readable("pae=on\nacpi=off\ncpus=2\nvram=lots\n");
        assert_eq!(flag(&record, "pae"), Some(true));
        assert_eq!(flag(&record, "acpi"), Some(false));
        assert_eq!(flag(&record, "ioapic"), None);
        assert_eq!(number(&record, "cpus"), Some(2));
        assert_eq!(number(&record, "vram"), None);
        assert_eq!(on_off(true), "on");
        assert_eq!(on_off(false), "off");
    }
}
