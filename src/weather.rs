use tracing::debug;

use crate::host::StateStore;
use crate::types::Temperature;

/// Read the outdoor temperature, preferring a dedicated outdoor sensor
/// (unit-normalized) over the weather entity's `temperature` attribute.
pub(crate) fn outdoor_temperature(
    store: &dyn StateStore,
    outdoor_sensor: Option<&str>,
    weather_entity: Option<&str>,
) -> Option<Temperature> {
    if let Some(sensor) = outdoor_sensor
        && let Some(state) = store.get(sensor)
        && let Some(temp) = Temperature::from_reading(&state.state, state.unit())
    {
        return Some(temp);
    }

    if let Some(entity) = weather_entity
        && let Some(state) = store.get(entity)
        && let Some(temp) = state.attr_f64("temperature")
    {
        // Weather entities report in the host's configured unit; assumed Celsius.
        return Some(Temperature::from_celsius(temp));
    }

    None
}

/// Nudge the target by a small tiered amount based on outdoor conditions:
/// cooler target when it is hot outside, warmer when it is cold, scaled by
/// `influence` in [0, 1]. Result rounded to 0.1 deg C.
pub fn adjusted_target(base: Temperature, outdoor: Temperature, influence: f64) -> Temperature {
    let o = outdoor.celsius();
    let step = if o > 30.0 {
        -0.5
    } else if o > 25.0 {
        -0.25
    } else if o < 15.0 {
        0.5
    } else if o < 20.0 {
        0.25
    } else {
        0.0
    };
    let adjustment = step * influence;

    debug!(
        outdoor = o,
        adjustment,
        "weather adjustment for target temperature"
    );

    let adjusted = ((base.celsius() + adjustment) * 10.0).round() / 10.0;
    Temperature::from_celsius(adjusted)
}
