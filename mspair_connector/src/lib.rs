mod py_generator;

use pyo3::prelude::*;

use crate::py_generator::PyPairDataGenerator;

#[pymodule]
fn mspair_connector(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyPairDataGenerator>()?;
    Ok(())
}
