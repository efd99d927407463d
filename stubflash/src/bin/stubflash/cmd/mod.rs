pub mod chip;
pub mod dry_run;
