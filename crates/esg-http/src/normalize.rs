/// Normalizes a listed company name into the form rating sites index it by:
/// lowercase, no leading "the", no punctuation, usual legal suffixes abbreviated.
pub fn clean_company_name(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| !matches!(c, '.' | ',' | '"' | '\''))
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
        .enumerate()
        .filter(|(i, word)| !(*i == 0 && word == "the"))
        .map(|(_, word)| match word.as_str() {
            "corporation" => "corp".to_string(),
            "company" => "co".to_string(),
            "incorporated" => "inc".to_string(),
            "limited" => "ltd".to_string(),
            _ => word,
        })
        .collect::<Vec<_>>()
        .join(" ")
}
