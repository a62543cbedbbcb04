use time::{OffsetDateTime, macros::format_description};
use uuid::Uuid;

/// Generate a sortable, collision-resistant trace identifier:
/// `trc_<YYYYMMDD>_<HHMMSS>_<8 hex chars>`.
pub fn generate(now: OffsetDateTime) -> String {
	let format = format_description!("[year][month][day]_[hour][minute][second]");
	let stamp = now.format(&format).unwrap_or_else(|_| String::from("00000000_000000"));
	let suffix = Uuid::new_v4().simple().to_string();

	format!("trc_{stamp}_{}", &suffix[..8])
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	#[test]
	fn id_embeds_utc_stamp_and_hex_suffix() {
		let id = generate(datetime!(2026-02-13 14:30:22 UTC));

		assert!(id.starts_with("trc_20260213_143022_"));

		let suffix = id.rsplit('_').next().unwrap();

		assert_eq!(suffix.len(), 8);
		assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
	}

	#[test]
	fn ids_do_not_collide_for_one_instant() {
		let now = datetime!(2026-02-13 14:30:22 UTC);

		assert_ne!(generate(now), generate(now));
	}
}
