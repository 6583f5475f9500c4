use std::path::PathBuf;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use ridership_panel::config::StudyConfig;
use ridership_panel::output::write_records;
use ridership_panel::panel::{PanelAssembler, daily_panel};
use ridership_panel::regions::RegionResolver;
use ridership_panel::trips::TripCleaner;
use ridership_panel::weather::normalize::localize;
use ridership_panel::weather::{HourlyValues, UtcObservation, WeatherTable};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn study_config() -> StudyConfig {
    let toml = format!(
        r#"
timezone = "America/Los_Angeles"

[[windows]]
tag = "fallback"
start_date = "2024-11-03"
end_date = "2024-11-04"

[[regions]]
name = "DTLA"
latitude = 34.05661
longitude = -118.237213

[[regions]]
name = "Westside"
latitude = 34.022449
longitude = -118.438332

[stations]
path = "{}"

[paths]
raw_trips = ["{}"]
cleaned_trips = "trips_{{tag}}.csv"
weather_dir = "weather"
hourly_panel = "hourly_{{tag}}.csv"
"#,
        fixture("stations.csv").display(),
        fixture("trips.csv").display()
    );
    StudyConfig::from_toml_str(&toml).expect("fixture config must be valid")
}

/// Synthetic provider series: one sample per UTC hour, temperature = index.
fn utc_series(first: &str, hours: i64) -> Vec<UtcObservation> {
    let first: DateTime<Utc> = first.parse().unwrap();
    (0..hours)
        .map(|i| UtcObservation {
            utc: first + Duration::hours(i),
            values: HourlyValues {
                temperature_c: Some(i as f64),
                apparent_temperature_c: Some(i as f64 - 1.0),
                rel_humidity: Some(60.0),
                precip_mm: Some(0.2),
                rain_mm: Some(0.2),
                snowfall_cm: Some(0.0),
                wind_speed_ms: Some(3.0),
                wind_gust_ms: Some(6.5),
                cloud_cover: Some(40.0),
            },
        })
        .collect()
}

#[tokio::test]
async fn test_clean_then_assemble_across_fall_back() {
    let config = study_config();
    let window = config.window(None).unwrap();

    let (trips, report) = TripCleaner::new(&config.cleaning, window)
        .clean_files(&config.paths.raw_trips)
        .await
        .unwrap();

    assert_eq!(report.rows_seen, 11);
    assert_eq!(report.rows_kept, 5);
    assert_eq!(report.duplicate, 1);
    assert_eq!(report.short_round_trip, 1);
    assert_eq!(report.virtual_station, 1);
    assert_eq!(report.exceeds_max_duration, 1);
    assert_eq!(report.outside_window, 1);
    assert_eq!(report.malformed, 1);

    let mut weather = WeatherTable::new();
    for region in &config.regions {
        let tz = config.region_timezone(region).unwrap();
        let series = utc_series("2024-11-02T00:00:00Z", 96);
        let rows = localize(&region.name, tz, &series, window).unwrap();
        weather.insert_region(&region.name, rows);
    }

    let resolver = RegionResolver::from_config(&config).unwrap();
    let (rows, assembly) = PanelAssembler::new(&config, window, &resolver)
        .assemble(&trips, &weather, false)
        .unwrap();

    assert_eq!(rows.len(), 2 * 2 * 24);
    assert_eq!(assembly.trips_counted, 4);
    assert_eq!(assembly.trips_unassigned, 1);
    assert_eq!(assembly.missing_weather_rows, 0);

    let nov3 = NaiveDate::from_ymd_opt(2024, 11, 3).unwrap();
    let nov4 = NaiveDate::from_ymd_opt(2024, 11, 4).unwrap();
    let find = |region: &str, date: NaiveDate, hour: u32| {
        rows.iter()
            .find(|r| r.region == region && r.date == date && r.hour == hour)
            .unwrap()
    };

    let dtla_8 = find("DTLA", nov3, 8);
    assert_eq!(dtla_8.trip_count, 2);
    assert_eq!(dtla_8.avg_duration_min, Some(15.0));
    assert!(dtla_8.avg_distance_mi.is_some());
    assert_eq!(find("Westside", nov3, 14).trip_count, 1);
    assert_eq!(find("Westside", nov4, 1).trip_count, 1);
    assert_eq!(find("DTLA", nov4, 12).trip_count, 0);

    // 01:00 occurs twice on 2024-11-03; the PDT instant (08:00 UTC) is kept
    let one_am: Vec<_> = rows
        .iter()
        .filter(|r| r.region == "DTLA" && r.date == nov3 && r.hour == 1)
        .collect();
    assert_eq!(one_am.len(), 1);
    assert_eq!(one_am[0].temperature_c, Some(32.0));
    assert_eq!(find("DTLA", nov3, 2).temperature_c, Some(34.0));

    assert!(rows.iter().all(|r| r.temperature_c.is_some() && r.missing_weather_flag == 0));
    assert_eq!(find("DTLA", nov3, 0).weekday, 6);
    assert_eq!(find("DTLA", nov3, 0).is_weekend, 1);

    let daily = daily_panel(&rows);
    assert_eq!(daily.len(), 4);
    assert_eq!(daily[0].trip_count, 2);
    assert_eq!(daily[2].region, "Westside");
    assert_eq!(daily.iter().map(|d| d.trip_count).sum::<u32>(), 4);

    let dir = std::env::temp_dir().join("ridership_panel_integration");
    let _ = std::fs::remove_dir_all(&dir);
    write_records(&dir.join("first.csv"), &rows).unwrap();
    write_records(&dir.join("second.csv"), &rows).unwrap();
    let first = std::fs::read(dir.join("first.csv")).unwrap();
    assert_eq!(first, std::fs::read(dir.join("second.csv")).unwrap());
    let header = String::from_utf8(first).unwrap();
    assert!(header.starts_with("region,date,date_id,hour,month,weekday,is_weekend,trip_count,"));
    std::fs::remove_dir_all(&dir).unwrap();
}
