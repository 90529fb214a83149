use rndsnd_cli::watch::roots_for_paths;
use std::path::PathBuf;

#[test]
fn only_roots_with_changed_audio_are_rescanned() {
    let roots = vec![PathBuf::from("/music"), PathBuf::from("/samples")];
    let changed = vec![
        PathBuf::from("/samples/kick.WAV"),
        PathBuf::from("/music/cover.jpg"),
        PathBuf::from("/elsewhere/x.wav"),
    ];
    assert_eq!(roots_for_paths(&changed, &roots), vec![PathBuf::from("/samples")]);
}

#[test]
fn root_prefix_must_match_whole_components() {
    let roots = vec![PathBuf::from("/music")];
    let changed = vec![PathBuf::from("/music2/a.flac")];
    assert!(roots_for_paths(&changed, &roots).is_empty());
    let changed = vec![PathBuf::from("/music/live/a.flac")];
    assert_eq!(roots_for_paths(&changed, &roots), roots);
}
