use media_core::resolution::Profile;

/// One rendition row feeding the master playlist builder.
#[derive(Debug, Clone, Copy)]
pub struct RenditionEntry<'a> {
    pub profile: &'a Profile,
}

/// Builds the master playlist: a leading `#EXTM3U`, then one
/// `#EXT-X-STREAM-INF`/URI pair per rendition in
/// strictly descending source height.
pub fn master_playlist(renditions: &[RenditionEntry<'_>]) -> String {
    let mut sorted: Vec<&RenditionEntry> = renditions.iter().collect();
    sorted.sort_by(|a, b| b.profile.height.cmp(&a.profile.height));

    let mut out = String::from("#EXTM3U\n");
    for entry in sorted {
        let p = entry.profile;
        out.push_str(&format!(
            "#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH={},RESOLUTION={}x{},CODECS=\"{}\"\n",
            p.bandwidth_bps(),
            p.width,
            p.height,
            p.codecs,
        ));
        out.push_str(&format!("hls_{}/index-.m3u8\n", p.name));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_core::resolution::{PROFILE_240P, PROFILE_480P, PROFILE_720P};

    #[test]
    fn master_playlist_descending_height() {
        let entries = vec![
            RenditionEntry { profile: &PROFILE_240P },
            RenditionEntry { profile: &PROFILE_720P },
            RenditionEntry { profile: &PROFILE_480P },
        ];
        let playlist = master_playlist(&entries);
        let lines: Vec<&str> = playlist.lines().collect();
        assert_eq!(lines[0], "#EXTM3U");
        assert!(lines[1].contains("RESOLUTION=1280x720"));
        assert_eq!(lines[2], "hls_720p/index-.m3u8");
        assert!(lines[3].contains("RESOLUTION=854x480"));
        assert!(lines[5].contains("RESOLUTION=426x240"));
    }

    #[test]
    fn master_playlist_exact_stream_inf_format() {
        let entries = vec![RenditionEntry { profile: &PROFILE_720P }];
        let playlist = master_playlist(&entries);
        assert!(playlist.contains(
            "#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH=2894000,RESOLUTION=1280x720,CODECS=\"avc1.640028,mp4a.40.5\""
        ));
    }
}
