pub const THIS: &str = "this";
pub const SUPER: &str = "super";
pub const CLOCK: &str = "clock";

pub const MAX_ARGUMENTS: usize = 255;
