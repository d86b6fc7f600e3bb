use crate::config;
use crate::error::GridError;
use crate::flatten;
use crate::geometry::Point;
use crate::index::{Binning, GridIndex};
use crate::sort::SortBackend;
use numpy::{PyArray1, PyArray2, PyArrayMethods, PyReadonlyArray2, PyUntypedArrayMethods};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

impl From<GridError> for PyErr {
    fn from(e: GridError) -> Self {
        PyValueError::new_err(e.to_string())
    }
}

/// Python handle owning both the index and the particle buffer it sorts.
#[pyclass]
pub struct PyGridIndex {
    pub(crate) inner: GridIndex<SortBackend>,
    pub(crate) particles: Vec<Point>,
}

impl PyGridIndex {
    fn binning(&self) -> PyResult<Binning<'_>> {
        Ok(self.inner.view(&self.particles)?)
    }
}

#[pymethods]
impl PyGridIndex {
    #[new]
    #[pyo3(signature = (width, height, cell_size, sort="parallel"))]
    fn new(width: f64, height: f64, cell_size: f64, sort: &str) -> PyResult<Self> {
        let backend: SortBackend = sort.parse().map_err(PyValueError::new_err)?;
        let inner = GridIndex::with_sorter(width, height, cell_size, backend)?;
        Ok(PyGridIndex {
            inner,
            particles: Vec::new(),
        })
    }

    /// Bins `positions` and returns them in sorted order as an (N, 2) array.
    /// Indices returned by later queries refer to this order.
    fn rebin<'py>(
        &mut self,
        py: Python<'py>,
        positions: PyReadonlyArray2<'_, f64>,
    ) -> PyResult<Bound<'py, PyArray2<f64>>> {
        let mut particles = get_positions(&positions)?;
        self.inner.rebin(&mut particles)?;
        self.particles = particles;

        let n = self.particles.len();
        let flat: Vec<f64> = self.particles.iter().flat_map(|p| [p.x, p.y]).collect();
        Ok(PyArray1::from_vec(py, flat).reshape((n, 2))?)
    }

    fn cell(&self, key: usize) -> PyResult<(usize, usize)> {
        let range = self.binning()?.cell(key)?;
        Ok((range.start, range.end))
    }

    fn neighbors_of(&self, point: [f64; 2]) -> PyResult<Vec<[f64; 2]>> {
        let p = Point::new(point[0], point[1]);
        let nb = self.binning()?.neighbors_of(&p)?;
        Ok(nb.into_iter().map(|q| [q.x, q.y]).collect())
    }

    fn nearest(&self, point: [f64; 2]) -> PyResult<usize> {
        let p = Point::new(point[0], point[1]);
        Ok(self.binning()?.nearest(&p)?)
    }

    /// Flat neighbor lists as a dict of `distances` (squared), `indices`
    /// and `offsets` arrays.
    #[pyo3(signature = (radius=None))]
    fn find_all_neighbor_lists<'py>(
        &self,
        py: Python<'py>,
        radius: Option<f64>,
    ) -> PyResult<Bound<'py, PyDict>> {
        let binning = self.binning()?;
        let (dists, indices) = match radius {
            Some(r) => binning.find_all_neighbor_lists_within(r)?,
            None => binning.find_all_neighbor_lists(),
        };
        let flat = flatten::flatten(&dists, &indices)?;

        let dict = PyDict::new(py);
        dict.set_item("distances", PyArray1::from_vec(py, flat.distances))?;
        dict.set_item(
            "indices",
            PyArray1::from_vec(py, flat.indices.iter().map(|&i| i as i64).collect()),
        )?;
        dict.set_item(
            "offsets",
            PyArray1::from_vec(py, flat.offsets.iter().map(|&o| o as i64).collect()),
        )?;
        Ok(dict)
    }

    #[getter]
    fn dims(&self) -> (usize, usize) {
        self.inner.geometry().dims()
    }

    fn __repr__(&self) -> String {
        let g = self.inner.geometry();
        let (w, h) = g.dims();
        format!(
            "PyGridIndex(width={}, height={}, cell_size={}, cells={}x{}, particles={})",
            g.width(),
            g.height(),
            g.cell_size(),
            w,
            h,
            self.particles.len()
        )
    }
}

fn get_positions(positions: &PyReadonlyArray2<'_, f64>) -> PyResult<Vec<Point>> {
    if positions.shape()[1] != 2 {
        return Err(PyValueError::new_err("Positions must be (N, 2)"));
    }

    if let Ok(slice) = positions.as_slice()
        && let Ok(cast_slice) = bytemuck::try_cast_slice::<f64, Point>(slice)
    {
        return Ok(cast_slice.to_vec());
    }

    // Fallback: non-contiguous input
    let pos_view = positions.as_array();
    Ok(pos_view
        .rows()
        .into_iter()
        .map(|row| Point::new(row[0], row[1]))
        .collect())
}

#[pyfunction]
fn get_num_threads() -> usize {
    rayon::current_num_threads()
}

#[pyfunction]
fn set_num_threads(n: usize) -> PyResult<()> {
    // build_global only succeeds once; later calls keep the existing pool.
    let _ = rayon::ThreadPoolBuilder::new()
        .num_threads(n)
        .build_global();
    Ok(())
}

#[pyfunction]
fn get_parallel_threshold() -> usize {
    config::get_parallel_threshold()
}

#[pyfunction]
fn set_parallel_threshold(val: usize) {
    config::set_parallel_threshold(val);
}

#[pyfunction]
fn get_candidate_capacity() -> usize {
    config::get_candidate_capacity()
}

#[pyfunction]
fn set_candidate_capacity(val: usize) {
    config::set_candidate_capacity(val);
}

#[pyfunction]
fn get_neighbor_capacity() -> usize {
    config::get_neighbor_capacity()
}

#[pyfunction]
fn set_neighbor_capacity(val: usize) {
    config::set_neighbor_capacity(val);
}

#[pyfunction]
#[pyo3(signature = (level=None))]
fn init_logging(level: Option<String>) {
    crate::init_logging(level.as_deref());
}

#[pymodule]
fn cellgrid_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyGridIndex>()?;
    m.add_function(wrap_pyfunction!(get_num_threads, m)?)?;
    m.add_function(wrap_pyfunction!(set_num_threads, m)?)?;
    m.add_function(wrap_pyfunction!(init_logging, m)?)?;
    m.add_function(wrap_pyfunction!(get_parallel_threshold, m)?)?;
    m.add_function(wrap_pyfunction!(set_parallel_threshold, m)?)?;
    m.add_function(wrap_pyfunction!(get_candidate_capacity, m)?)?;
    m.add_function(wrap_pyfunction!(set_candidate_capacity, m)?)?;
    m.add_function(wrap_pyfunction!(get_neighbor_capacity, m)?)?;
    m.add_function(wrap_pyfunction!(set_neighbor_capacity, m)?)?;
    Ok(())
}

#[cfg(test)]
#[allow(deprecated)]
mod tests {
    use super::*;

    fn positions_array<'py>(py: Python<'py>, coords: Vec<f64>) -> Bound<'py, PyArray2<f64>> {
        let n = coords.len() / 2;
        PyArray1::from_vec(py, coords).reshape((n, 2)).unwrap()
    }

    #[test]
    fn test_python_api_basic() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|_py| {
            assert!(get_parallel_threshold() > 0);
            assert!(get_num_threads() > 0);
        });
    }

    #[test]
    fn test_pygridindex_new() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|_py| {
            let grid = PyGridIndex::new(10.0, 5.0, 1.0, "counting").unwrap();
            assert_eq!(grid.dims(), (10, 5));
            assert!(grid.__repr__().starts_with("PyGridIndex("));

            assert!(PyGridIndex::new(0.0, 5.0, 1.0, "parallel").is_err());
            assert!(PyGridIndex::new(10.0, 5.0, 1.0, "bogus").is_err());
        });
    }

    #[test]
    fn test_rebin_and_query() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            let mut grid = PyGridIndex::new(4.0, 4.0, 1.0, "parallel").unwrap();
            assert!(grid.nearest([0.5, 0.5]).is_err());

            let positions = positions_array(py, vec![3.5, 3.5, 0.5, 0.5, 0.6, 0.5]);
            let sorted = grid.rebin(py, positions.readonly()).unwrap();
            let sorted = sorted.readonly();
            let view = sorted.as_array();
            assert_eq!(view.shape(), &[3, 2]);
            assert_eq!(view[[2, 0]], 3.5);

            assert_eq!(grid.cell(0).unwrap(), (0, 2));
            assert_eq!(grid.cell(15).unwrap(), (2, 3));
            assert_eq!(grid.neighbors_of([0.1, 0.1]).unwrap().len(), 2);

            let i = grid.nearest([0.65, 0.5]).unwrap();
            assert_eq!(grid.particles[i], Point::new(0.6, 0.5));
        });
    }

    #[test]
    fn test_find_all_neighbor_lists() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            let mut grid = PyGridIndex::new(4.0, 4.0, 1.0, "parallel").unwrap();
            let positions = positions_array(py, vec![0.5, 0.5, 1.0, 0.5, 3.5, 3.5]);
            grid.rebin(py, positions.readonly()).unwrap();

            let res = grid.find_all_neighbor_lists(py, None).unwrap();
            let offsets = res
                .get_item("offsets")
                .unwrap()
                .unwrap()
                .extract::<numpy::PyReadonlyArray1<i64>>()
                .unwrap();
            assert_eq!(offsets.as_slice().unwrap(), &[0, 2, 4, 5]);

            let res = grid.find_all_neighbor_lists(py, Some(0.25)).unwrap();
            let offsets = res
                .get_item("offsets")
                .unwrap()
                .unwrap()
                .extract::<numpy::PyReadonlyArray1<i64>>()
                .unwrap();
            assert_eq!(offsets.as_slice().unwrap(), &[0, 1, 2, 3]);

            assert!(grid.find_all_neighbor_lists(py, Some(2.0)).is_err());
        });
    }

    #[test]
    fn test_bad_positions() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            let mut grid = PyGridIndex::new(4.0, 4.0, 1.0, "parallel").unwrap();
            let wrong_shape = PyArray1::from_vec(py, vec![0.0; 6]).reshape((2, 3)).unwrap();
            assert!(grid.rebin(py, wrong_shape.readonly()).is_err());

            let outside = positions_array(py, vec![5.0, 0.5]);
            assert!(grid.rebin(py, outside.readonly()).is_err());

            let empty = numpy::PyArray2::<f64>::zeros(py, [0, 2], false);
            assert!(grid.rebin(py, empty.readonly()).is_err());
        });
    }

    #[test]
    fn test_global_configs() {
        pyo3::prepare_freethreaded_python();
        let _ = set_num_threads(2);
        assert!(get_num_threads() > 0);

        init_logging(Some("debug".to_string()));

        let saved = get_candidate_capacity();
        set_candidate_capacity(64);
        assert_eq!(get_candidate_capacity(), 64);
        set_candidate_capacity(saved);

        let saved = get_neighbor_capacity();
        set_neighbor_capacity(8);
        assert_eq!(get_neighbor_capacity(), 8);
        set_neighbor_capacity(saved);
    }
}
