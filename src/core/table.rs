//! Plain-text rendering of the registration table (`LIST` / `TABLE`).

use super::record::IdentityRecord;

const LABEL_WIDTH: usize = 10;
const NAME_WIDTH: usize = 11;
const UID_WIDTH: usize = 12;

fn fit(value: &str, width: usize) -> String {
    let truncated: String = value.chars().take(width).collect();
    format!("{truncated:<width$}")
}

pub fn render_table(records: &[IdentityRecord]) -> String {
    let mut out = format!("Registered cards: {}\n", records.len());
    if records.is_empty() {
        out.push_str("Store is empty.\n");
        return out;
    }
    out.push_str(&format!(
        " No | {} | {} | {} | Scan Count\n",
        fit("UID", UID_WIDTH),
        fit("Label", LABEL_WIDTH),
        fit("Name", NAME_WIDTH)
    ));
    for (i, record) in records.iter().enumerate() {
        out.push_str(&format!(
            "{:>3} | {} | {} | {} | {}\n",
            i + 1,
            fit(&record.display_id, UID_WIDTH),
            fit(&record.owner_label, LABEL_WIDTH),
            fit(&record.owner_name, NAME_WIDTH),
            record.scan_count
        ));
    }
    out
}
