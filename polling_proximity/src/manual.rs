/*!

This is the long-form manual for `polling_proximity` and `pollprox`.

## Overview

`pollprox` measures how far census units (tracts or blocks) are from their
polling places, and whether units where a demographic subgroup is the
majority are farther away than the other units of similar population density.

The analysis proceeds in three steps:
1. every census unit receives a centroid, an area and a population density
2. the distance from each centroid to the closest polling place, and the mean
   distance to the 5 closest polling places, are computed. This result is
   saved in a cache file and reused by later runs.
3. the units are split into density deciles. Inside each decile, the mean
   distances of the majority and non-majority units are compared with a
   Welch t-test. A linear regression and correlations are computed over all
   the units.

## Coordinate systems

Both the census units and the polling places carry an EPSG code, written as
`EPSG:4326`. The two must be identical: `pollprox` does not reproject.

- geographic systems (4326, 4269, 4267, 4258, 4617, 4283): distances are
  great-circle distances in metres and areas are geodesic areas in square metres
- any other code is treated as a projected system: distances and areas are
  computed in the plane, in the units of the projection (usually metres)

The density is expressed in people per square unit of the system. For
geographic data, this is people per square metre.

## Census sources

### `shapefile`

Polygons read from an ESRI shapefile (`.shp` with its `.dbf`). The
identifier field `idField` may be a character or a numeric field.

### `geojson`

Polygons or multipolygons read from a GeoJSON `FeatureCollection`. The
identifier is read from the feature properties.

## Population attributes

### `embedded`

The subgroup and total populations are fields of the census features
(`subgroupField`, `totalField`).

### `csv`

The populations are joined from a CSV file with a header row, by matching
`idColumn` with the identifier of the census units. Units without a matching
row have unknown populations and are excluded from the density analysis.

### `censusApi`

The populations are fetched from the Census Data API, for example:

```text
https://api.census.gov/data/2020/dec/pl?get=P1_001N,P1_004N&for=tract:*&in=state:45
```

The identifier of each row is the concatenation of the geography codes
(state, county, tract, ...), which is the GEOID used by the TIGER/Line
shapefiles. The request is attempted `maxAttempts` times (3 by default).

## Polling places

### `csv`, `xlsx`

One row per polling place, with an identifier column and two coordinate
columns (`xColumn` for the longitude or easting, `yColumn` for the latitude
or northing). For Excel files, `excelWorksheetName` selects the worksheet
when the workbook has more than one.

### `geojson`

Point features. The identifier is read from the `idColumn` property, or
generated from the feature position when missing.

## Rules

- `majorityThreshold` (default 0.5): a unit is in the majority group if its
  subgroup share is strictly above the threshold, in the non-majority group if
  it is strictly below. Units exactly at the threshold are in neither group.
- `quantiles` (default 10): the number of density strata. Strata are closed
  intervals, so a unit whose density is exactly a breakpoint is counted in
  both neighbouring strata.
- `fewerPlacesPolicy` (default `meanOfAvailable`): with fewer than 5
  polling places, either average the distances to all of them, or stop with
  an error (`error`).
- `searchStrategy` (default `bruteForce`): `rtree` uses a spatial index.
  Both return the same distances.
- `parallel` (default true): measure the units on all the cores.

## Outputs

- the cache file (MessagePack): the measured units, tagged with the
  coordinate system and a fingerprint of the sources. When the sources change,
  the cache is still used and a warning is printed. Delete the file or use
  `--recompute`.
- the results file (MessagePack): one row per density decile.
- the summary (JSON): deciles, regressions and correlations. Undefined values
  are written as `null`.

*/
