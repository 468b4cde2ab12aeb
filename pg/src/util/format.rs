use num_format::{CustomFormat, Grouping, ToFormattedString};

/// `1_234_567` style grouping used in all counter log lines
pub fn number_format() -> CustomFormat {
    CustomFormat::builder()
        .grouping(Grouping::Standard)
        .minus_sign("-")
        .separator("_")
        .build()
        .expect("static number format should be valid")
}

/// A step/episode counter ready for the log
pub fn formatted(count: usize) -> String { count.to_formatted_string(&number_format()) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatted_counter() {
        assert_eq!(formatted(0), "0");
        assert_eq!(formatted(999), "999");
        assert_eq!(formatted(1_234_567), "1_234_567");
    }
}
