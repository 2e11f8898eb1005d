// 🔢 Display order: discussion position first, unscheduled amendements last

use crate::models::Amendement;

/// Scheduled before unscheduled, then position, then number and revision
pub fn display_key(amendement: &Amendement) -> (bool, u32, u32, u32) {
    (
        amendement.position.is_none(),
        amendement.position.unwrap_or(0),
        amendement.num,
        amendement.rectif,
    )
}

pub fn sort_for_display(amendements: &mut [Amendement]) {
    amendements.sort_by_key(display_key);
}
