use crate::model::Platform;

/// Operating-system markers, checked in order. Windows wins over Linux so a
/// "Windows (Linux tools)" style label still prices as a licensed platform.
const PLATFORM_MARKERS: [(&str, Platform); 2] =
    [("windows", Platform::Windows), ("linux", Platform::Linux)];

/// Detect the platform from any number of free-text labels
/// (product name, meter name, operating system attribute...).
pub fn detect_platform<'a, I>(labels: I) -> Option<Platform>
where
    I: IntoIterator<Item = &'a str>,
{
    let combined = labels
        .into_iter()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ");
    PLATFORM_MARKERS
        .iter()
        .find(|(marker, _)| combined.contains(marker))
        .map(|(_, platform)| *platform)
}
