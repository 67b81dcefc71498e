use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

fn encode(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

pub fn normalize_base(api_base: &str) -> &str {
    api_base.trim().trim_end_matches('/')
}

pub fn trending_url(api_base: &str, limit: u32, offset: u32, window: &str) -> String {
    format!(
        "{}/v1/tracks/trending?limit={limit}&offset={offset}&time={}",
        normalize_base(api_base),
        encode(window)
    )
}

pub fn search_url(api_base: &str, query: &str, limit: u32, offset: u32) -> String {
    format!(
        "{}/v1/tracks/search?query={}&limit={limit}&offset={offset}",
        normalize_base(api_base),
        encode(query)
    )
}

pub fn track_url(api_base: &str, track_id: &str) -> String {
    format!("{}/v1/tracks/{}", normalize_base(api_base), encode(track_id))
}

/// The catalog answers this with a redirect to the actual media file.
pub fn stream_url(api_base: &str, track_id: &str) -> String {
    format!("{}/stream", track_url(api_base, track_id))
}

#[cfg(test)]
mod tests {
    use super::{search_url, stream_url, trending_url};

    #[test]
    fn url_builder_encodes_queries() {
        let search = search_url("https://api.example/", "Daft Punk/live", 20, 0);
        assert_eq!(
            search,
            "https://api.example/v1/tracks/search?query=Daft%20Punk%2Flive&limit=20&offset=0"
        );

        let trending = trending_url("https://api.example", 24, 48, "allTime");
        assert!(trending.ends_with("trending?limit=24&offset=48&time=allTime"));
    }

    #[test]
    fn stream_url_escapes_identifier() {
        assert_eq!(
            stream_url("https://api.example//", "a b"),
            "https://api.example/v1/tracks/a%20b/stream"
        );
    }
}
