use crate::data_models::{Dataset, Observation};
use crate::schema::Column;
use log::info;

/// Inputs of the traffic-related pollution proxy.
pub const VEHICLE_INPUTS: [Column; 4] = [Column::Pm25, Column::Pm10, Column::No2, Column::Co];
/// Inputs of the industry-related pollution proxy.
pub const INDUSTRIAL_INPUTS: [Column; 2] = [Column::So2, Column::O3];

/// Sum of the present inputs; missing inputs contribute nothing.
fn proxy(row: &Observation, inputs: &[Column]) -> f64 {
    inputs.iter().filter_map(|c| row.float(*c)).sum()
}

/// Adds `vehicle_pollution` and `industrial_pollution`. Input columns are
/// left as they are.
pub fn add_pollution_proxies(dataset: &mut Dataset) {
    for row in dataset.rows_mut().iter_mut() {
        row.vehicle_pollution = Some(proxy(row, &VEHICLE_INPUTS));
        row.industrial_pollution = Some(proxy(row, &INDUSTRIAL_INPUTS));
    }
    dataset.add_column(Column::VehiclePollution);
    dataset.add_column(Column::IndustrialPollution);
    info!("Added pollution proxies to {} rows", dataset.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_proxies_are_sums_of_inputs() {
        let row = Observation {
            pm25: Some(10.0),
            pm10: Some(20.0),
            no2: Some(30.0),
            co: Some(400.0),
            so2: Some(5.0),
            o3: Some(60.0),
            ..Default::default()
        };
        let mut dataset = Dataset::new(vec![Column::Pm25, Column::Pm10, Column::No2, Column::Co, Column::So2, Column::O3], vec![row.clone()]);
        add_pollution_proxies(&mut dataset);

        let out = &dataset.rows()[0];
        assert_relative_eq!(out.vehicle_pollution.unwrap(), 460.0);
        assert_relative_eq!(out.industrial_pollution.unwrap(), 65.0);
        assert_eq!(out.pm25, row.pm25);
        assert!(dataset.has_column(Column::VehiclePollution));
        assert!(dataset.has_column(Column::IndustrialPollution));
    }

    #[test]
    fn test_missing_inputs_are_skipped() {
        let row = Observation { so2: Some(7.0), ..Default::default() };
        let mut dataset = Dataset::new(vec![Column::So2], vec![row]);
        add_pollution_proxies(&mut dataset);
        assert_eq!(dataset.rows()[0].vehicle_pollution, Some(0.0));
        assert_eq!(dataset.rows()[0].industrial_pollution, Some(7.0));
    }
}
