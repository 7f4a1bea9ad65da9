#[cfg(test)]
pub mod test_helpers {
    use std::fs;
    use std::path::{Path, PathBuf};

    pub const GENERATION_HEADER: &str =
        "DATE_TIME,PLANT_ID,SOURCE_KEY,DC_POWER,AC_POWER,DAILY_YIELD,TOTAL_YIELD";
    pub const WEATHER_HEADER: &str =
        "DATE_TIME,PLANT_ID,SOURCE_KEY,AMBIENT_TEMPERATURE,MODULE_TEMPERATURE,IRRADIATION";

    pub fn write_csv(dir: &Path, name: &str, header: &str, rows: &[String]) -> PathBuf {
        let path = dir.join(name);
        let mut contents = String::from(header);
        contents.push('\n');
        for row in rows {
            contents.push_str(row);
            contents.push('\n');
        }
        fs::write(&path, contents).expect("failed to write fixture");
        path
    }

    /// Two inverters per plant at every hour from 06:00 to 18:00 on one day.
    /// AC output follows a bell curve peaking at noon; DC is ten times AC.
    pub fn generation_rows(plant_id: i64, day_first: bool) -> Vec<String> {
        let mut rows = Vec::new();
        for hour in 6..=18u32 {
            let ac = ac_at(hour);
            let stamp = if day_first {
                format!("15-05-2020 {:02}:00", hour)
            } else {
                format!("2020-05-15 {:02}:00:00", hour)
            };
            for inverter in ["inv-1", "inv-2"] {
                rows.push(format!(
                    "{stamp},{plant_id},{plant_id}-{inverter},{:.1},{:.1},0,0",
                    ac * 10.0,
                    ac
                ));
            }
        }
        rows
    }

    /// One sensor per plant, every hour from 00:00 to 23:00.
    pub fn weather_rows(plant_id: i64) -> Vec<String> {
        (0..24u32)
            .map(|hour| {
                let ac = if (6..=18).contains(&hour) { ac_at(hour) } else { 0.0 };
                format!(
                    "2020-05-15 {:02}:00:00,{plant_id},{plant_id}-sensor,{:.2},{:.2},{:.4}",
                    hour,
                    20.0 + f64::from(hour) * 0.5,
                    20.0 + ac / 10.0,
                    ac / 1000.0
                )
            })
            .collect()
    }

    pub fn ac_at(hour: u32) -> f64 {
        let distance = f64::from(hour) - 12.0;
        (1000.0 - distance * distance * 25.0).max(0.0)
    }
}
